//! Non-personalised baseline: score every item by its interaction count

use crate::ranking::RankingModel;
use crate::store::InteractionStore;
use crate::{ItemId, UserId};
use latent_rank_core::Result;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MostPopular {
    store: InteractionStore,
    counts: Vec<usize>,
}

impl MostPopular {
    pub fn new(store: InteractionStore) -> Self {
        Self {
            store,
            counts: Vec::new(),
        }
    }

    pub fn store(&self) -> &InteractionStore {
        &self.store
    }

    pub fn add_feedback(&mut self, pairs: &[(UserId, ItemId)]) {
        for &(user, item) in pairs {
            if self.store.add(user, item) {
                if item >= self.counts.len() {
                    self.counts.resize(item + 1, 0);
                }
                self.counts[item] += 1;
            }
        }
    }

    pub fn remove_feedback(&mut self, pairs: &[(UserId, ItemId)]) {
        for &(user, item) in pairs {
            if self.store.remove(user, item) {
                if let Some(count) = self.counts.get_mut(item) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    /// Interaction count of `item`; 0 for unknown items
    pub fn count(&self, item: ItemId) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }
}

impl RankingModel for MostPopular {
    fn init_model(&mut self) -> Result<()> {
        self.counts = self.store.item_popularity();
        debug!(items = self.counts.len(), "counted item popularity");
        Ok(())
    }

    /// Counts are maintained exactly; an iteration only recounts
    fn iterate(&mut self) -> Result<()> {
        self.init_model()
    }

    fn predict(&self, _user: UserId, item: ItemId) -> Option<f32> {
        self.counts.get(item).map(|&count| count as f32)
    }

    /// No trainable parameters, so there is nothing to minimise
    fn compute_objective(&self) -> f64 {
        0.0
    }
}
