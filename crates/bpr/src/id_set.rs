//! Sorted-vector id set
//!
//! Backs both adjacency views of the interaction store. A sorted `Vec` gives
//! ordered iteration, `O(log n)` membership, `O(1)` access by position (needed
//! for uniform sampling) and linear-time intersection counts.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Ordered set of dense integer ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedIdSet {
    ids: Vec<usize>,
}

impl SortedIdSet {
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Build from arbitrary ids; duplicates are dropped
    pub fn from_unsorted(mut ids: Vec<usize>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Insert `id`, returning `false` if it was already present
    pub fn insert(&mut self, id: usize) -> bool {
        match self.ids.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.ids.insert(pos, id);
                true
            }
        }
    }

    /// Remove `id`, returning `false` if it was absent
    pub fn remove(&mut self, id: usize) -> bool {
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                self.ids.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id at sorted position `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<usize> {
        self.ids.get(index).copied()
    }

    pub fn first(&self) -> Option<usize> {
        self.ids.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.ids.last().copied()
    }

    /// Uniformly random member, `None` when empty
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.ids.is_empty() {
            None
        } else {
            Some(self.ids[rng.gen_range(0..self.ids.len())])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ids.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.ids
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Number of ids present in both sets (merge walk over the sorted vectors)
    pub fn intersection_count(&self, other: &SortedIdSet) -> usize {
        let (mut a, mut b) = (0, 0);
        let mut count = 0;

        while a < self.ids.len() && b < other.ids.len() {
            match self.ids[a].cmp(&other.ids[b]) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    count += 1;
                    a += 1;
                    b += 1;
                }
            }
        }

        count
    }
}

impl FromIterator<usize> for SortedIdSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SortedIdSet {
    type Item = &'a usize;
    type IntoIter = std::slice::Iter<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_insert_keeps_order_and_rejects_duplicates() {
        let mut set = SortedIdSet::new();
        assert!(set.insert(5));
        assert!(set.insert(1));
        assert!(set.insert(3));
        assert!(!set.insert(3));

        assert_eq!(set.as_slice(), &[1, 3, 5]);
        assert_eq!(set.first(), Some(1));
        assert_eq!(set.last(), Some(5));
    }

    #[test]
    fn test_remove() {
        let mut set: SortedIdSet = vec![4, 2, 2, 9].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert!(set.remove(2));
        assert!(!set.remove(2));
        assert!(!set.contains(2));
        assert!(set.contains(9));
    }

    #[test]
    fn test_intersection_count() {
        let a = SortedIdSet::from_unsorted(vec![1, 2, 3, 7, 9]);
        let b = SortedIdSet::from_unsorted(vec![0, 2, 3, 8, 9, 10]);
        assert_eq!(a.intersection_count(&b), 3);
        assert_eq!(b.intersection_count(&a), 3);
        assert_eq!(a.intersection_count(&SortedIdSet::new()), 0);
    }

    #[test]
    fn test_choose_returns_member() {
        let mut rng = StdRng::seed_from_u64(3);
        let set = SortedIdSet::from_unsorted(vec![10, 20, 30]);
        for _ in 0..50 {
            assert!(set.contains(set.choose(&mut rng).unwrap()));
        }
        assert_eq!(SortedIdSet::new().choose(&mut rng), None);
    }
}
