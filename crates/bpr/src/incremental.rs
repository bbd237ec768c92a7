//! Online updates between training epochs
//!
//! New or withdrawn feedback is folded into the store, and only the rows of
//! the touched users and items are retrained, with a bounded number of
//! masked gradient steps:
//!
//! - a user row is redrawn and receives `|items(u)|` steps updating only that row;
//! - an item row is redrawn and receives `|interactions| / (max_item_id + 1)`
//!   steps, roughly how often full training visits one item, updating only that
//!   item's row and bias.

use std::collections::BTreeSet;

use crate::model::FactorModel;
use crate::sampler::Sampler;
use crate::store::InteractionStore;
use crate::update::{BprUpdate, UpdateMask};
use crate::{ItemId, UserId};
use latent_rank_core::Result;
use rand::rngs::StdRng;
use tracing::debug;

/// Borrowed view of a trainer's store, model and random source
#[derive(Debug)]
pub struct IncrementalUpdater<'a> {
    store: &'a mut InteractionStore,
    model: &'a mut FactorModel,
    sampler: &'a mut Sampler,
    rng: &'a mut StdRng,
    update: BprUpdate,
    update_users: bool,
    update_items: bool,
}

impl<'a> IncrementalUpdater<'a> {
    pub(crate) fn new(
        store: &'a mut InteractionStore,
        model: &'a mut FactorModel,
        sampler: &'a mut Sampler,
        rng: &'a mut StdRng,
        update: BprUpdate,
        update_users: bool,
        update_items: bool,
    ) -> Self {
        Self {
            store,
            model,
            sampler,
            rng,
            update,
            update_users,
            update_items,
        }
    }

    /// Add a batch of interactions, growing the model for unseen ids,
    /// then retrain the touched rows
    pub fn add_feedback(&mut self, pairs: &[(UserId, ItemId)]) -> Result<()> {
        let mut users = BTreeSet::new();
        let mut items = BTreeSet::new();

        for &(user, item) in pairs {
            self.store.add(user, item);
            self.model.add_user(user, &mut *self.rng)?;
            self.model.add_item(item, &mut *self.rng)?;
            users.insert(user);
            items.insert(item);
        }

        debug!(
            pairs = pairs.len(),
            users = users.len(),
            items = items.len(),
            "added feedback"
        );
        self.retrain_touched(&users, &items)
    }

    /// Remove a batch of interactions, then retrain the touched rows
    ///
    /// Pairs that are not present are ignored.
    pub fn remove_feedback(&mut self, pairs: &[(UserId, ItemId)]) -> Result<()> {
        let mut users = BTreeSet::new();
        let mut items = BTreeSet::new();
        let mut removed = 0;

        for &(user, item) in pairs {
            if self.store.remove(user, item) {
                users.insert(user);
                items.insert(item);
                removed += 1;
            }
        }

        debug!(pairs = pairs.len(), removed, "removed feedback");
        self.retrain_touched(&users, &items)
    }

    /// Register a user id without feedback
    pub fn add_user(&mut self, user: UserId) -> Result<()> {
        self.store.add_user(user);
        self.model.add_user(user, &mut *self.rng)?;
        Ok(())
    }

    /// Register an item id without feedback
    pub fn add_item(&mut self, item: ItemId) -> Result<()> {
        self.store.add_item(item);
        self.model.add_item(item, &mut *self.rng)?;
        Ok(())
    }

    /// Drop all of a user's feedback and zero its row
    pub fn remove_user(&mut self, user: UserId) {
        let items = self.store.remove_user(user);
        self.model.remove_user(user);
        debug!(user, removed = items.len(), "removed user");
    }

    /// Drop all of an item's feedback and zero its row and bias
    pub fn remove_item(&mut self, item: ItemId) {
        let users = self.store.remove_item(item);
        self.model.remove_item(item);
        debug!(item, removed = users.len(), "removed item");
    }

    /// Redraw `user`'s row and replay `|items(user)|` user-only steps
    ///
    /// Returns the number of steps taken.
    pub fn retrain_user(&mut self, user: UserId) -> Result<usize> {
        self.sampler.refresh(self.store);
        self.retrain_user_row(user)
    }

    /// Redraw `item`'s row and replay `|interactions| / (max_item_id + 1)` item-only steps
    ///
    /// Returns the number of steps taken.
    pub fn retrain_item(&mut self, item: ItemId) -> Result<usize> {
        self.sampler.refresh(self.store);
        self.retrain_item_row(item)
    }

    fn retrain_touched(&mut self, users: &BTreeSet<UserId>, items: &BTreeSet<ItemId>) -> Result<()> {
        self.sampler.refresh(self.store);

        if self.update_users {
            for &user in users {
                self.retrain_user_row(user)?;
            }
        }

        if self.update_items {
            for &item in items {
                self.retrain_item_row(item)?;
            }
        }

        Ok(())
    }

    fn retrain_user_row(&mut self, user: UserId) -> Result<usize> {
        if !self.store.is_user_live(user) {
            return Ok(0);
        }
        self.model.add_user(user, &mut *self.rng)?;
        self.model.reinit_user(user, &mut *self.rng);

        let planned = self.store.items_of(user).len();
        let mut steps = 0;
        for _ in 0..planned {
            let Some(triple) = self.sampler.sample_for_user(self.store, user, &mut *self.rng) else {
                break;
            };
            self.update.apply(&mut *self.model, triple, UpdateMask::USER);
            steps += 1;
        }

        debug!(user, steps, "retrained user");
        Ok(steps)
    }

    fn retrain_item_row(&mut self, item: ItemId) -> Result<usize> {
        // Removed items keep their zeroed row and are never drawn as negatives.
        if !self.store.is_item_live(item) {
            return Ok(0);
        }
        self.model.add_item(item, &mut *self.rng)?;
        self.model.reinit_item(item, &mut *self.rng);

        let planned = self.store.len() / self.store.num_items().max(1);
        let mut steps = 0;
        for _ in 0..planned {
            let Some((triple, is_positive)) =
                self.sampler.sample_for_item(self.store, item, &mut *self.rng)
            else {
                break;
            };

            let mask = if is_positive {
                UpdateMask::POSITIVE
            } else {
                UpdateMask::NEGATIVE
            };
            self.update.apply(&mut *self.model, triple, mask);
            steps += 1;
        }

        debug!(item, steps, "retrained item");
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BprConfig;
    use crate::store::InteractionStore;
    use crate::trainer::BprTrainer;

    fn trainer() -> BprTrainer {
        let mut pairs = Vec::new();
        for user in 0..10 {
            for item in 0..10 {
                if (user + item) % 3 == 0 {
                    pairs.push((user, item));
                }
            }
        }
        let store = InteractionStore::from_pairs(pairs);
        let mut trainer =
            BprTrainer::new(BprConfig::new().num_factors(4).num_epochs(5).seed(3), store).unwrap();
        trainer.train().unwrap();
        trainer
    }

    #[test]
    fn test_retrain_user_takes_one_step_per_item() {
        let mut trainer = trainer();
        let expected = trainer.store().items_of(4).len();
        let before = trainer.model().item_matrix().to_owned();

        let steps = trainer.incremental().unwrap().retrain_user(4).unwrap();
        assert_eq!(steps, expected);
        assert_eq!(trainer.model().item_matrix(), before.view());
    }

    #[test]
    fn test_retrain_item_step_count() {
        let mut trainer = trainer();
        let expected = trainer.store().len() / 10;
        let users_before = trainer.model().user_matrix().to_owned();
        let other_item = trainer.model().item_factors(3).unwrap().to_owned();

        let steps = trainer.incremental().unwrap().retrain_item(2).unwrap();
        assert_eq!(steps, expected);
        assert_eq!(trainer.model().user_matrix(), users_before.view());
        assert_eq!(trainer.model().item_factors(3).unwrap(), other_item.view());
    }

    #[test]
    fn test_add_feedback_grows_store_and_model() {
        let mut trainer = trainer();
        trainer
            .incremental()
            .unwrap()
            .add_feedback(&[(12, 3), (2, 14)])
            .unwrap();

        assert!(trainer.store().contains(12, 3));
        assert!(trainer.store().contains(2, 14));
        assert_eq!(trainer.model().num_users(), 13);
        assert_eq!(trainer.model().num_items(), 15);
        assert!(trainer.predict(12, 14).is_some());
        trainer.store().check_consistency().unwrap();
    }

    #[test]
    fn test_add_feedback_without_item_updates_keeps_items() {
        let mut pairs = Vec::new();
        for user in 0..6 {
            pairs.push((user, user % 4));
            pairs.push((user, (user + 1) % 4));
        }
        let config = BprConfig::new()
            .num_factors(4)
            .num_epochs(3)
            .seed(5)
            .incremental_updates(true, false);
        let mut trainer = BprTrainer::new(config, InteractionStore::from_pairs(pairs)).unwrap();
        trainer.train().unwrap();
        let before = trainer.model().item_matrix().to_owned();

        trainer.incremental().unwrap().add_feedback(&[(0, 3)]).unwrap();
        assert_eq!(trainer.model().item_matrix(), before.view());
    }

    #[test]
    fn test_remove_feedback_and_entities() {
        let mut trainer = trainer();
        {
            let mut updater = trainer.incremental().unwrap();
            updater.remove_feedback(&[(0, 0), (0, 1)]).unwrap();
            updater.remove_item(9);
            updater.remove_user(9);
        }

        assert!(!trainer.store().contains(0, 0));
        assert!(trainer.store().users_of(9).is_empty());
        assert!(trainer.store().items_of(9).is_empty());
        assert!(trainer
            .model()
            .item_factors(9)
            .unwrap()
            .iter()
            .all(|&w| w == 0.0));
        assert_eq!(trainer.model().item_bias(9), Some(0.0));
        assert_eq!(trainer.predict(9, 2), Some(trainer.model().item_bias(2).unwrap()));
        trainer.store().check_consistency().unwrap();
    }

    #[test]
    fn test_removed_item_is_not_retrained() {
        let mut pairs = Vec::new();
        for user in 0..10 {
            pairs.extend([(user, user % 5), (user, 5 + user % 3)]);
        }
        let config = BprConfig::new().num_factors(4).seed(8);
        let mut trainer = BprTrainer::new(config, InteractionStore::from_pairs(pairs)).unwrap();
        trainer.init_model().unwrap();
        {
            let mut updater = trainer.incremental().unwrap();
            updater.remove_item(5);
            assert_eq!(updater.retrain_item(5).unwrap(), 0);
            updater.add_feedback(&[(1, 4)]).unwrap();
        }
        assert!(trainer.model().item_factors(5).unwrap().iter().all(|&w| w == 0.0));

        trainer.iterate().unwrap();
        assert!(trainer.model().item_factors(5).unwrap().iter().all(|&w| w == 0.0));
        assert_eq!(trainer.model().item_bias(5), Some(0.0));
    }

    #[test]
    fn test_incremental_requires_initialised_trainer() {
        let store = InteractionStore::from_pairs(vec![(0, 0), (1, 1)]);
        let mut trainer = BprTrainer::new(BprConfig::new().seed(1), store).unwrap();
        assert!(trainer.incremental().is_err());
    }
}
