//! Model-family interface and top-N ranking

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::id_set::SortedIdSet;
use crate::parallel::ParallelTrainer;
use crate::store::InteractionStore;
use crate::trainer::BprTrainer;
use crate::{ItemId, UserId};
use latent_rank_core::Result;
use serde::Serialize;

/// Operations shared by every recommender in the crate
///
/// Variants own their parameters and update logic; nothing is shared through
/// a common base beyond this interface.
pub trait RankingModel {
    /// Allocate and initialise parameters from the training data
    fn init_model(&mut self) -> Result<()>;

    /// One pass of training
    fn iterate(&mut self) -> Result<()>;

    /// Score of `item` for `user`; `None` when either id is unknown to the model
    fn predict(&self, user: UserId, item: ItemId) -> Option<f32>;

    /// Training objective (lower is better)
    fn compute_objective(&self) -> f64;
}

impl RankingModel for BprTrainer {
    fn init_model(&mut self) -> Result<()> {
        BprTrainer::init_model(self)
    }

    fn iterate(&mut self) -> Result<()> {
        BprTrainer::iterate(self).map(|_| ())
    }

    fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
        BprTrainer::predict(self, user, item)
    }

    fn compute_objective(&self) -> f64 {
        self.compute_loss()
    }
}

impl RankingModel for ParallelTrainer {
    fn init_model(&mut self) -> Result<()> {
        ParallelTrainer::init_model(self)
    }

    fn iterate(&mut self) -> Result<()> {
        ParallelTrainer::iterate(self).map(|_| ())
    }

    fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
        ParallelTrainer::predict(self, user, item)
    }

    fn compute_objective(&self) -> f64 {
        self.compute_loss()
    }
}

/// An item with its score
///
/// Ordered best first: higher score, then lower item id on ties.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoredItem {
    pub item: ItemId,
    pub score: f32,
}

impl ScoredItem {
    pub fn new(item: ItemId, score: f32) -> Self {
        Self { item, score }
    }
}

// Reversed so that `BinaryHeap` keeps the worst entry on top.
impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.item.cmp(&other.item))
    }
}

impl PartialEq for ScoredItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for ScoredItem {}

/// Bounded collector of the `k` highest-scoring items
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<ScoredItem>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k),
        }
    }

    pub fn offer(&mut self, entry: ScoredItem) {
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if let Some(mut top) = self.heap.peek_mut() {
            if entry < *top {
                *top = entry;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Entries ordered by descending score
    pub fn into_sorted_vec(self) -> Vec<ScoredItem> {
        // Ascending by the reversed order is descending by score.
        self.heap.into_sorted_vec()
    }
}

/// The `n` best-scored `candidates` for `user`, skipping `ignore`
///
/// Candidates the model cannot score are left out.
pub fn recommend<M, I>(
    model: &M,
    user: UserId,
    candidates: I,
    ignore: &SortedIdSet,
    n: usize,
) -> Vec<ScoredItem>
where
    M: RankingModel + ?Sized,
    I: IntoIterator<Item = ItemId>,
{
    let mut top = TopK::new(n);
    for item in candidates {
        if ignore.contains(item) {
            continue;
        }
        if let Some(score) = model.predict(user, item) {
            top.offer(ScoredItem::new(item, score));
        }
    }
    top.into_sorted_vec()
}

/// Top `n` live items of `store` the user has not interacted with yet
pub fn recommend_unseen<M>(
    model: &M,
    store: &InteractionStore,
    user: UserId,
    n: usize,
) -> Vec<ScoredItem>
where
    M: RankingModel + ?Sized,
{
    recommend(model, user, store.items(), store.items_of(user), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl RankingModel for Fixed {
        fn init_model(&mut self) -> Result<()> {
            Ok(())
        }

        fn iterate(&mut self) -> Result<()> {
            Ok(())
        }

        fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
            if user > 0 || item >= 6 {
                return None;
            }
            Some([0.1, 0.9, 0.5, 0.7, 0.3, 0.8][item])
        }

        fn compute_objective(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_top_k_keeps_highest() {
        let mut top = TopK::new(2);
        for (item, score) in [(0, 0.2), (1, 0.9), (2, -1.0), (3, 0.5)] {
            top.offer(ScoredItem::new(item, score));
        }
        let items: Vec<ItemId> = top.into_sorted_vec().iter().map(|e| e.item).collect();
        assert_eq!(items, vec![1, 3]);
    }

    #[test]
    fn test_equal_scores_order_by_item_id() {
        let a = ScoredItem::new(1, 0.0);
        let b = ScoredItem::new(2, 0.0);
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a, ScoredItem::new(1, 0.0));

        let mut top = TopK::new(3);
        for item in [7, 3, 9, 1, 5] {
            top.offer(ScoredItem::new(item, 0.5));
        }
        top.offer(ScoredItem::new(8, 0.9));
        let items: Vec<ItemId> = top.into_sorted_vec().iter().map(|e| e.item).collect();
        assert_eq!(items, vec![8, 1, 3]);
    }

    #[test]
    fn test_top_zero_is_empty() {
        let mut top = TopK::new(0);
        top.offer(ScoredItem::new(1, 1.0));
        assert!(top.is_empty());
    }

    #[test]
    fn test_recommend_orders_and_ignores() {
        let ignore = SortedIdSet::from_unsorted(vec![1]);
        let result = recommend(&Fixed, 0, 0..8, &ignore, 3);
        let items: Vec<ItemId> = result.iter().map(|e| e.item).collect();
        assert_eq!(items, vec![5, 3, 2]);
        assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_recommend_unknown_user_is_empty() {
        let result = recommend(&Fixed, 4, 0..6, &SortedIdSet::new(), 3);
        assert!(result.is_empty());
    }

    #[test]
    fn test_recommend_unseen_uses_store() {
        let store = InteractionStore::from_pairs(vec![(0, 1), (0, 5), (1, 0), (1, 2), (1, 3), (1, 4)]);
        let result = recommend_unseen(&Fixed, &store, 0, 10);
        let items: Vec<ItemId> = result.iter().map(|e| e.item).collect();
        assert_eq!(items, vec![3, 2, 4, 0]);
    }
}
