//! Immutable compressed copy of an interaction store
//!
//! Users' items are stored in one contiguous, per-user sorted array indexed by
//! `user_pointers` (CSR layout), so membership is a binary search and the whole
//! structure can be shared read-only across worker threads.

use crate::sampler::FeedbackView;
use crate::store::InteractionStore;
use crate::{ItemId, UserId};

#[derive(Debug, Clone)]
pub struct InteractionSnapshot {
    num_users: usize,
    num_items: usize,
    user_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
    pairs: Vec<(UserId, ItemId)>,
    live_items: Vec<bool>,
    num_live_items: usize,
}

impl InteractionSnapshot {
    /// Sorted items of `user`; empty for users outside the snapshot
    pub fn items_of(&self, user: UserId) -> &[ItemId] {
        if user >= self.num_users {
            return &[];
        }

        let start = self.user_pointers[user];
        let stop = self.user_pointers[user + 1];
        &self.item_ids[start..stop]
    }

    #[inline]
    pub fn contains(&self, user: UserId, item: ItemId) -> bool {
        self.items_of(user).binary_search(&item).is_ok()
    }

    /// Interaction at `index`, in the same order as the source store's pair list
    #[inline]
    pub fn pair(&self, index: usize) -> (UserId, ItemId) {
        self.pairs[index]
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn num_live_items(&self) -> usize {
        self.num_live_items
    }

    pub fn is_item_live(&self, item: ItemId) -> bool {
        self.live_items.get(item).copied().unwrap_or(false)
    }
}

impl FeedbackView for InteractionSnapshot {
    fn item_id_bound(&self) -> usize {
        self.num_items
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

impl<'a> From<&'a InteractionStore> for InteractionSnapshot {
    fn from(store: &'a InteractionStore) -> Self {
        let num_users = store.num_users();
        let mut user_pointers = Vec::with_capacity(num_users + 1);
        let mut item_ids = Vec::with_capacity(store.len());

        user_pointers.push(0);
        for user in 0..num_users {
            item_ids.extend(store.items_of(user).iter());
            user_pointers.push(item_ids.len());
        }

        let num_items = store.num_items();
        InteractionSnapshot {
            num_users,
            num_items,
            user_pointers,
            item_ids,
            pairs: store.pairs().to_vec(),
            live_items: (0..num_items).map(|item| store.is_item_live(item)).collect(),
            num_live_items: store.num_live_items(),
        }
    }
}
