//! Dual-indexed positive feedback store
//!
//! Every interaction lives in three places at once: the user view
//! (`user -> items`), the item view (`item -> users`) and a flat list used for
//! uniform pair sampling. A `(user, item) -> position` map keeps membership
//! checks and removals from the flat list `O(1)`.
//!
//! Watermarks: users and items are tracked in explicit live-id sets. Removing a
//! single feedback pair never shrinks a watermark; removing the entity holding
//! the maximum id recomputes it by scanning down to the next live id, so gaps
//! below the maximum are handled correctly.

use crate::id_set::SortedIdSet;
use crate::sampler::FeedbackView;
use crate::snapshot::InteractionSnapshot;
use crate::{ItemId, UserId};
use latent_rank_core::{LatentRankError, Result};
use std::collections::HashMap;
use tracing::debug;

static EMPTY: SortedIdSet = SortedIdSet::new();

/// Sparse positive-only user-item matrix
#[derive(Debug, Clone, Default)]
pub struct InteractionStore {
    by_user: Vec<SortedIdSet>,
    by_item: Vec<SortedIdSet>,
    pairs: Vec<(UserId, ItemId)>,
    pair_index: HashMap<(UserId, ItemId), usize>,
    live_users: Vec<bool>,
    live_items: Vec<bool>,
    max_user_id: Option<UserId>,
    max_item_id: Option<ItemId>,
    num_live_items: usize,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a stream of `(user, item)` pairs; duplicates collapse
    ///
    /// Sorts the pairs once and builds every view in bulk, so loading costs
    /// `O(n log n)` regardless of how the interactions are spread over ids.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (UserId, ItemId)>,
    {
        let mut pairs: Vec<(UserId, ItemId)> = pairs.into_iter().collect();
        pairs.sort_unstable();
        pairs.dedup();

        let num_users = pairs.iter().map(|&(user, _)| user + 1).max().unwrap_or(0);
        let num_items = pairs.iter().map(|&(_, item)| item + 1).max().unwrap_or(0);

        let mut user_items: Vec<Vec<ItemId>> = vec![Vec::new(); num_users];
        let mut item_users: Vec<Vec<UserId>> = vec![Vec::new(); num_items];
        let mut live_users = vec![false; num_users];
        let mut live_items = vec![false; num_items];
        let mut pair_index = HashMap::with_capacity(pairs.len());

        for (position, &(user, item)) in pairs.iter().enumerate() {
            user_items[user].push(item);
            item_users[item].push(user);
            live_users[user] = true;
            live_items[item] = true;
            pair_index.insert((user, item), position);
        }

        let num_live_items = live_items.iter().filter(|&&live| live).count();
        debug!(
            interactions = pairs.len(),
            users = num_users,
            items = num_items,
            "built interaction store"
        );

        Self {
            by_user: user_items.into_iter().map(SortedIdSet::from_unsorted).collect(),
            by_item: item_users.into_iter().map(SortedIdSet::from_unsorted).collect(),
            pairs,
            pair_index,
            live_users,
            live_items,
            max_user_id: num_users.checked_sub(1),
            max_item_id: num_items.checked_sub(1),
            num_live_items,
        }
    }

    /// Register a user id, growing the user view if needed
    ///
    /// Returns `true` if the id was not live before.
    pub fn add_user(&mut self, user: UserId) -> bool {
        if user >= self.live_users.len() {
            self.live_users.resize(user + 1, false);
            self.by_user.resize_with(user + 1, SortedIdSet::new);
        }

        let added = !self.live_users[user];
        self.live_users[user] = true;
        if self.max_user_id.map_or(true, |max| user > max) {
            self.max_user_id = Some(user);
        }
        added
    }

    /// Register an item id, growing the item view if needed
    pub fn add_item(&mut self, item: ItemId) -> bool {
        if item >= self.live_items.len() {
            self.live_items.resize(item + 1, false);
            self.by_item.resize_with(item + 1, SortedIdSet::new);
        }

        let added = !self.live_items[item];
        self.live_items[item] = true;
        if added {
            self.num_live_items += 1;
        }
        if self.max_item_id.map_or(true, |max| item > max) {
            self.max_item_id = Some(item);
        }
        added
    }

    /// Insert a positive interaction into both views
    ///
    /// Returns `false` (and changes nothing) if the pair was already present.
    pub fn add(&mut self, user: UserId, item: ItemId) -> bool {
        self.add_user(user);
        self.add_item(item);

        if self.pair_index.contains_key(&(user, item)) {
            return false;
        }

        self.by_user[user].insert(item);
        self.by_item[item].insert(user);
        self.pair_index.insert((user, item), self.pairs.len());
        self.pairs.push((user, item));
        true
    }

    /// Remove a positive interaction from both views; absent pairs are a no-op
    pub fn remove(&mut self, user: UserId, item: ItemId) -> bool {
        if !self.detach_pair(user, item) {
            return false;
        }

        self.by_user[user].remove(item);
        self.by_item[item].remove(user);
        true
    }

    /// Drop a pair from the flat list and its index, leaving both views untouched
    fn detach_pair(&mut self, user: UserId, item: ItemId) -> bool {
        let Some(position) = self.pair_index.remove(&(user, item)) else {
            return false;
        };

        self.pairs.swap_remove(position);
        if let Some(&moved) = self.pairs.get(position) {
            self.pair_index.insert(moved, position);
        }
        true
    }

    /// Remove a user and all of their feedback
    ///
    /// Returns the items the user had interacted with.
    pub fn remove_user(&mut self, user: UserId) -> Vec<ItemId> {
        if !self.is_user_live(user) {
            return Vec::new();
        }

        // The user's own view is dropped whole; only the mirrors shrink per pair.
        let items: Vec<ItemId> = std::mem::take(&mut self.by_user[user]).iter().collect();
        for &item in &items {
            self.detach_pair(user, item);
            self.by_item[item].remove(user);
        }

        self.live_users[user] = false;
        if self.max_user_id == Some(user) {
            self.max_user_id = highest_live(&self.live_users, user);
            debug!(
                removed = user,
                new_max = ?self.max_user_id,
                "recomputed user watermark"
            );
        }

        items
    }

    /// Remove an item and all feedback on it
    ///
    /// Returns the users that had interacted with the item.
    pub fn remove_item(&mut self, item: ItemId) -> Vec<UserId> {
        if !self.is_item_live(item) {
            return Vec::new();
        }

        let users: Vec<UserId> = std::mem::take(&mut self.by_item[item]).iter().collect();
        for &user in &users {
            self.detach_pair(user, item);
            self.by_user[user].remove(item);
        }

        self.live_items[item] = false;
        self.num_live_items -= 1;
        if self.max_item_id == Some(item) {
            self.max_item_id = highest_live(&self.live_items, item);
            debug!(
                removed = item,
                new_max = ?self.max_item_id,
                "recomputed item watermark"
            );
        }

        users
    }

    /// Items the user has interacted with; empty for unknown users
    pub fn items_of(&self, user: UserId) -> &SortedIdSet {
        self.by_user.get(user).unwrap_or(&EMPTY)
    }

    /// Users that interacted with the item; empty for unknown items
    pub fn users_of(&self, item: ItemId) -> &SortedIdSet {
        self.by_item.get(item).unwrap_or(&EMPTY)
    }

    #[inline]
    pub fn contains(&self, user: UserId, item: ItemId) -> bool {
        self.pair_index.contains_key(&(user, item))
    }

    /// Number of pairs present in both stores
    pub fn overlap(&self, other: &InteractionStore) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };

        small
            .pairs
            .iter()
            .filter(|&&(user, item)| large.contains(user, item))
            .count()
    }

    /// Number of interactions
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Flat interaction list; order changes under removal
    pub fn pairs(&self) -> &[(UserId, ItemId)] {
        &self.pairs
    }

    pub fn pair(&self, index: usize) -> Option<(UserId, ItemId)> {
        self.pairs.get(index).copied()
    }

    pub fn max_user_id(&self) -> Option<UserId> {
        self.max_user_id
    }

    pub fn max_item_id(&self) -> Option<ItemId> {
        self.max_item_id
    }

    /// `max_user_id + 1`, or 0 for an empty store
    pub fn num_users(&self) -> usize {
        self.max_user_id.map_or(0, |max| max + 1)
    }

    /// `max_item_id + 1`, or 0 for an empty store
    pub fn num_items(&self) -> usize {
        self.max_item_id.map_or(0, |max| max + 1)
    }

    /// Number of live item ids; below `num_items` when ids have gaps
    pub fn num_live_items(&self) -> usize {
        self.num_live_items
    }

    pub fn is_user_live(&self, user: UserId) -> bool {
        self.live_users.get(user).copied().unwrap_or(false)
    }

    pub fn is_item_live(&self, item: ItemId) -> bool {
        self.live_items.get(item).copied().unwrap_or(false)
    }

    /// Live user ids in ascending order
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.live_users
            .iter()
            .enumerate()
            .filter_map(|(user, &live)| live.then_some(user))
    }

    /// Live item ids in ascending order
    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.live_items
            .iter()
            .enumerate()
            .filter_map(|(item, &live)| live.then_some(item))
    }

    /// Interaction count per item id, indexed by item
    pub fn item_popularity(&self) -> Vec<usize> {
        (0..self.num_items())
            .map(|item| self.users_of(item).len())
            .collect()
    }

    /// Verify that the three views agree
    ///
    /// A mismatch is a programming error: every downstream component assumes the
    /// views mirror each other, so callers should treat the error as fatal.
    pub fn check_consistency(&self) -> Result<()> {
        if self.pair_index.len() != self.pairs.len() {
            return Err(LatentRankError::InconsistentStore(format!(
                "pair index holds {} entries but pair list holds {}",
                self.pair_index.len(),
                self.pairs.len()
            )));
        }

        for (position, &(user, item)) in self.pairs.iter().enumerate() {
            if self.pair_index.get(&(user, item)) != Some(&position) {
                return Err(LatentRankError::InconsistentStore(format!(
                    "pair ({}, {}) is not indexed at position {}",
                    user, item, position
                )));
            }
            if !self.items_of(user).contains(item) {
                return Err(LatentRankError::InconsistentStore(format!(
                    "item {} missing from user view of user {}",
                    item, user
                )));
            }
            if !self.users_of(item).contains(user) {
                return Err(LatentRankError::InconsistentStore(format!(
                    "user {} missing from item view of item {}",
                    user, item
                )));
            }
        }

        let user_view_total: usize = self.by_user.iter().map(SortedIdSet::len).sum();
        let item_view_total: usize = self.by_item.iter().map(SortedIdSet::len).sum();
        if user_view_total != self.pairs.len() || item_view_total != self.pairs.len() {
            return Err(LatentRankError::InconsistentStore(format!(
                "view sizes disagree: users {}, items {}, pairs {}",
                user_view_total,
                item_view_total,
                self.pairs.len()
            )));
        }

        let live_items = self.live_items.iter().filter(|&&live| live).count();
        if live_items != self.num_live_items {
            return Err(LatentRankError::InconsistentStore(format!(
                "live item count {} but {} item ids are live",
                self.num_live_items, live_items
            )));
        }

        Ok(())
    }

    /// Immutable CSR copy for read-heavy phases such as parallel training
    pub fn snapshot(&self) -> InteractionSnapshot {
        InteractionSnapshot::from(self)
    }
}

impl FeedbackView for InteractionStore {
    fn item_id_bound(&self) -> usize {
        self.num_items()
    }

    fn live_item_count(&self) -> usize {
        self.num_live_items
    }

    fn is_live_item(&self, item: ItemId) -> bool {
        self.is_item_live(item)
    }

    fn positive_count(&self, user: UserId) -> usize {
        self.items_of(user).len()
    }

    fn is_positive(&self, user: UserId, item: ItemId) -> bool {
        self.contains(user, item)
    }

    fn interaction_count(&self) -> usize {
        self.pairs.len()
    }

    fn interaction(&self, index: usize) -> (UserId, ItemId) {
        self.pairs[index]
    }
}

fn highest_live(live: &[bool], below: usize) -> Option<usize> {
    live[..below].iter().rposition(|&is_live| is_live)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> InteractionStore {
        InteractionStore::from_pairs(vec![(0, 0), (0, 1), (1, 1), (1, 2)])
    }

    #[test]
    fn test_add_populates_both_views() {
        let store = sample_store();

        assert_eq!(store.len(), 4);
        assert_eq!(store.items_of(0).as_slice(), &[0, 1]);
        assert_eq!(store.users_of(1).as_slice(), &[0, 1]);
        assert!(store.contains(1, 2));
        assert!(!store.contains(0, 2));
        assert_eq!(store.max_user_id(), Some(1));
        assert_eq!(store.max_item_id(), Some(2));
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = sample_store();
        assert!(!store.add(0, 1));
        assert_eq!(store.len(), 4);
        assert_eq!(store.items_of(0).len(), 2);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_updates_both_views() {
        let mut store = sample_store();
        assert!(store.remove(0, 1));
        assert!(!store.items_of(0).contains(1));
        assert!(!store.users_of(1).contains(0));
        assert!(!store.contains(0, 1));
        assert_eq!(store.len(), 3);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_absent_pair_is_noop() {
        let mut store = sample_store();
        assert!(!store.remove(0, 2));
        assert!(!store.remove(42, 42));
        assert_eq!(store.len(), 4);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_feedback_removal_keeps_watermarks() {
        let mut store = sample_store();
        store.remove(1, 2);
        assert_eq!(store.max_item_id(), Some(2));
        assert_eq!(store.max_user_id(), Some(1));
    }

    #[test]
    fn test_remove_max_user_scans_past_gaps() {
        let mut store = InteractionStore::from_pairs(vec![(0, 0), (5, 1), (9, 2)]);
        assert_eq!(store.max_user_id(), Some(9));

        let removed = store.remove_user(9);
        assert_eq!(removed, vec![2]);
        // ids 6..=8 were never live, so the watermark jumps straight to 5
        assert_eq!(store.max_user_id(), Some(5));
        assert_eq!(store.num_users(), 6);
        assert!(!store.contains(9, 2));
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_non_max_item_keeps_watermark() {
        let mut store = sample_store();
        let users = store.remove_item(1);
        assert_eq!(users, vec![0, 1]);
        assert_eq!(store.max_item_id(), Some(2));
        assert!(!store.is_item_live(1));
        assert!(store.users_of(1).is_empty());
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_last_item_empties_watermark() {
        let mut store = InteractionStore::from_pairs(vec![(0, 0)]);
        store.remove_item(0);
        assert_eq!(store.max_item_id(), None);
        assert_eq!(store.num_items(), 0);
    }

    #[test]
    fn test_add_user_without_feedback() {
        let mut store = InteractionStore::new();
        assert!(store.add_user(3));
        assert!(!store.add_user(3));
        assert_eq!(store.num_users(), 4);
        assert!(store.items_of(3).is_empty());
        assert_eq!(store.users().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_unknown_ids_have_empty_views() {
        let store = sample_store();
        assert!(store.items_of(100).is_empty());
        assert!(store.users_of(100).is_empty());
    }

    #[test]
    fn test_overlap() {
        let a = sample_store();
        let b = InteractionStore::from_pairs(vec![(0, 0), (1, 2), (3, 3)]);
        assert_eq!(a.overlap(&b), 2);
        assert_eq!(b.overlap(&a), 2);
        assert_eq!(a.overlap(&InteractionStore::new()), 0);
    }

    #[test]
    fn test_item_popularity() {
        let store = sample_store();
        assert_eq!(store.item_popularity(), vec![1, 2, 1]);
    }

    #[test]
    fn test_swap_remove_reindexes_moved_pair() {
        let mut store = sample_store();
        store.remove(0, 0);
        store.remove(1, 1);
        store.check_consistency().unwrap();
        let mut remaining = store.pairs().to_vec();
        remaining.sort();
        assert_eq!(remaining, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_bulk_load_matches_incremental_adds() {
        let pairs = vec![(3, 1), (0, 4), (3, 1), (2, 0), (0, 1), (7, 4), (2, 0)];
        let bulk = InteractionStore::from_pairs(pairs.clone());
        let mut incremental = InteractionStore::new();
        for &(user, item) in &pairs {
            incremental.add(user, item);
        }

        bulk.check_consistency().unwrap();
        assert_eq!(bulk.len(), incremental.len());
        assert_eq!(bulk.max_user_id(), incremental.max_user_id());
        assert_eq!(bulk.max_item_id(), incremental.max_item_id());
        assert_eq!(bulk.num_live_items(), incremental.num_live_items());
        assert_eq!(bulk.users().collect::<Vec<_>>(), vec![0, 2, 3, 7]);
        assert_eq!(bulk.items().collect::<Vec<_>>(), vec![0, 1, 4]);
        for user in 0..bulk.num_users() {
            assert_eq!(bulk.items_of(user), incremental.items_of(user));
        }
        for item in 0..bulk.num_items() {
            assert_eq!(bulk.users_of(item), incremental.users_of(item));
        }
    }

    #[test]
    fn test_hub_item_loads_and_removes_in_one_pass() {
        let users = 50_000;
        let mut pairs: Vec<(UserId, ItemId)> = (0..users).map(|user| (user, 0)).collect();
        pairs.extend((0..users).step_by(1000).map(|user| (user, 1)));

        let mut store = InteractionStore::from_pairs(pairs);
        store.check_consistency().unwrap();
        assert_eq!(store.users_of(0).len(), users);

        let removed = store.remove_item(0);
        assert_eq!(removed.len(), users);
        assert!(store.users_of(0).is_empty());
        assert_eq!(store.len(), 50);
        assert_eq!(store.num_live_items(), 1);
        store.check_consistency().unwrap();

        let items = store.remove_user(0);
        assert_eq!(items, vec![1]);
        assert_eq!(store.len(), 49);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_live_item_count_tracks_gaps() {
        let mut store = InteractionStore::from_pairs(vec![(0, 0), (0, 5), (1, 5)]);
        assert_eq!(store.num_items(), 6);
        assert_eq!(store.num_live_items(), 2);

        store.add_item(3);
        assert_eq!(store.num_live_items(), 3);
        store.remove_item(5);
        assert_eq!(store.num_live_items(), 2);
        assert_eq!(store.num_items(), 4);
        store.remove_item(5);
        assert_eq!(store.num_live_items(), 2);
        store.check_consistency().unwrap();
    }
}
