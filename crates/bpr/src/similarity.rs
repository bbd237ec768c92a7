//! Binary correlations between users or items
//!
//! Computed from the id sets of the interaction store: two items are compared
//! through the users who interacted with them, two users through their items.

use std::fmt;
use std::str::FromStr;

use crate::id_set::SortedIdSet;
use crate::ranking::{ScoredItem, TopK};
use crate::store::InteractionStore;
use crate::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// Default weight of the conditioning side in the bidirectional variant
pub const DEFAULT_ALPHA: f32 = 0.5;

/// Correlation measure, selected once at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Correlation {
    /// `|A∩B| / sqrt(|A|·|B|)`
    Cosine,
    /// `|A∩B| / |A∪B|`
    Jaccard,
    /// `P(B|A) = |A∩B| / |A|`; not symmetric
    ConditionalProbability,
    /// `|A∩B| / (|A|^α · |B|^(1-α))`
    BidirectionalConditionalProbability { alpha: f32 },
    /// `|A∩B|`
    Cooccurrence,
}

impl Correlation {
    /// Correlation of two id sets; 0 when either is empty
    pub fn compute(&self, a: &SortedIdSet, b: &SortedIdSet) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let overlap = a.intersection_count(b) as f32;
        let (len_a, len_b) = (a.len() as f32, b.len() as f32);

        match *self {
            Correlation::Cosine => overlap / (len_a * len_b).sqrt(),
            Correlation::Jaccard => overlap / (len_a + len_b - overlap),
            Correlation::ConditionalProbability => overlap / len_a,
            Correlation::BidirectionalConditionalProbability { alpha } => {
                overlap / (len_a.powf(alpha) * len_b.powf(1.0 - alpha))
            }
            Correlation::Cooccurrence => overlap,
        }
    }

    /// Correlation of two items through their users
    pub fn items(&self, store: &InteractionStore, a: ItemId, b: ItemId) -> f32 {
        self.compute(store.users_of(a), store.users_of(b))
    }

    /// Correlation of two users through their items
    pub fn users(&self, store: &InteractionStore, a: UserId, b: UserId) -> f32 {
        self.compute(store.items_of(a), store.items_of(b))
    }

    /// The `k` live items most correlated with `item`, by descending correlation
    ///
    /// Items with zero correlation are left out.
    pub fn nearest_items(&self, store: &InteractionStore, item: ItemId, k: usize) -> Vec<ScoredItem> {
        let users = store.users_of(item);
        let mut top = TopK::new(k);

        for other in store.items() {
            if other == item {
                continue;
            }
            let score = self.compute(users, store.users_of(other));
            if score > 0.0 {
                top.offer(ScoredItem::new(other, score));
            }
        }

        top.into_sorted_vec()
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Correlation::Cosine
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Cosine => write!(f, "cosine"),
            Correlation::Jaccard => write!(f, "jaccard"),
            Correlation::ConditionalProbability => write!(f, "conditional-probability"),
            Correlation::BidirectionalConditionalProbability { alpha } => {
                write!(f, "bidirectional-conditional-probability({})", alpha)
            }
            Correlation::Cooccurrence => write!(f, "cooccurrence"),
        }
    }
}

impl FromStr for Correlation {
    type Err = String;

    /// Parses the kebab-case names; the bidirectional variant uses [`DEFAULT_ALPHA`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "cosine" => Ok(Correlation::Cosine),
            "jaccard" => Ok(Correlation::Jaccard),
            "conditional-probability" => Ok(Correlation::ConditionalProbability),
            "bidirectional-conditional-probability" => {
                Ok(Correlation::BidirectionalConditionalProbability {
                    alpha: DEFAULT_ALPHA,
                })
            }
            "cooccurrence" => Ok(Correlation::Cooccurrence),
            other => Err(format!("unknown correlation '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets() -> (SortedIdSet, SortedIdSet) {
        (
            SortedIdSet::from_unsorted(vec![1, 2, 3, 4]),
            SortedIdSet::from_unsorted(vec![3, 4, 5]),
        )
    }

    #[test]
    fn test_measures() {
        let (a, b) = sets();
        let close = |x: f32, y: f32| (x - y).abs() < 1e-6;

        assert!(close(Correlation::Cosine.compute(&a, &b), 2.0 / 12f32.sqrt()));
        assert!(close(Correlation::Jaccard.compute(&a, &b), 2.0 / 5.0));
        assert!(close(Correlation::ConditionalProbability.compute(&a, &b), 0.5));
        assert!(close(Correlation::ConditionalProbability.compute(&b, &a), 2.0 / 3.0));
        assert!(close(Correlation::Cooccurrence.compute(&a, &b), 2.0));

        let bidirectional = Correlation::BidirectionalConditionalProbability { alpha: 0.5 };
        assert!(close(bidirectional.compute(&a, &b), Correlation::Cosine.compute(&a, &b)));
        let one_sided = Correlation::BidirectionalConditionalProbability { alpha: 1.0 };
        assert!(close(one_sided.compute(&a, &b), 0.5));
    }

    #[test]
    fn test_empty_sets_are_uncorrelated() {
        let (a, _) = sets();
        assert_eq!(Correlation::Jaccard.compute(&a, &SortedIdSet::new()), 0.0);
    }

    #[test]
    fn test_nearest_items() {
        let store = InteractionStore::from_pairs(vec![
            (0, 0),
            (1, 0),
            (2, 0),
            (0, 1),
            (1, 1),
            (2, 2),
            (3, 3),
        ]);

        let nearest = Correlation::Jaccard.nearest_items(&store, 0, 5);
        let items: Vec<ItemId> = nearest.iter().map(|e| e.item).collect();
        assert_eq!(items, vec![1, 2]);
        assert!((nearest[0].score - 2.0 / 3.0).abs() < 1e-6);

        assert!((Correlation::Cooccurrence.users(&store, 0, 1) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse() {
        assert_eq!("jaccard".parse::<Correlation>().unwrap(), Correlation::Jaccard);
        assert_eq!(
            "Bidirectional_Conditional_Probability".parse::<Correlation>().unwrap(),
            Correlation::BidirectionalConditionalProbability { alpha: 0.5 }
        );
        assert!("pearson".parse::<Correlation>().is_err());
    }
}
