//! Training triple sampler
//!
//! Every triple `(u, i, j)` produced here satisfies `i ∈ items(u)` and
//! `j ∉ items(u)`. Users for whom no such pair exists (no positives, or every
//! item positive) are never selected; that is the sampler's precondition and is
//! not re-checked by the update code.

use crate::config::{NegativeSampling, SamplingStrategy};
use crate::store::InteractionStore;
use crate::{ItemId, UserId};
use latent_rank_core::{LatentRankError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

/// Popularity draws rejected in a row before falling back to a uniform draw
pub const POPULARITY_ATTEMPTS: usize = 64;

/// A training example: `user` prefers `positive` over `negative`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    pub user: UserId,
    pub positive: ItemId,
    pub negative: ItemId,
}

/// Read access to feedback shared by the live store and its frozen snapshots
pub trait FeedbackView {
    /// One past the highest item id ever seen
    fn item_id_bound(&self) -> usize;

    fn live_item_count(&self) -> usize;

    fn is_live_item(&self, item: ItemId) -> bool;

    fn positive_count(&self, user: UserId) -> usize;

    fn is_positive(&self, user: UserId, item: ItemId) -> bool;

    fn interaction_count(&self) -> usize;

    /// Interaction at `index`, for `index < interaction_count()`
    fn interaction(&self, index: usize) -> (UserId, ItemId);
}

/// Whether `user` has at least one positive and at least one live negative item
pub fn is_sampleable<V: FeedbackView + ?Sized>(view: &V, user: UserId) -> bool {
    let count = view.positive_count(user);
    count >= 1 && count < view.live_item_count()
}

/// Live item not linked to `user`, by rejection sampling
///
/// Popularity sampling takes the item of a random interaction and falls back
/// to a uniform draw after [`POPULARITY_ATTEMPTS`] rejections. `user` must be
/// sampleable, otherwise this never returns.
pub fn draw_negative<V, R>(
    view: &V,
    user: UserId,
    negative_sampling: NegativeSampling,
    rng: &mut R,
) -> ItemId
where
    V: FeedbackView + ?Sized,
    R: Rng + ?Sized,
{
    let interactions = view.interaction_count();
    if negative_sampling == NegativeSampling::Popularity && interactions > 0 {
        for _ in 0..POPULARITY_ATTEMPTS {
            let (_, item) = view.interaction(rng.gen_range(0..interactions));
            if !view.is_positive(user, item) {
                return item;
            }
        }
    }

    let bound = view.item_id_bound();
    loop {
        let item = rng.gen_range(0..bound);
        if view.is_live_item(item) && !view.is_positive(user, item) {
            return item;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sampler {
    strategy: SamplingStrategy,
    negative_sampling: NegativeSampling,
    sampleable_users: Vec<UserId>,
    /// Shuffled pair indices for `UniformPairWithoutReplacement`
    pair_order: Vec<usize>,
    cursor: usize,
    /// Per-user remaining positives for `UniformUserWithReplacement`
    pools: Vec<Vec<ItemId>>,
}

impl Sampler {
    pub fn new(strategy: SamplingStrategy, negative_sampling: NegativeSampling) -> Self {
        Self {
            strategy,
            negative_sampling,
            sampleable_users: Vec::new(),
            pair_order: Vec::new(),
            cursor: 0,
            pools: Vec::new(),
        }
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    pub fn negative_sampling(&self) -> NegativeSampling {
        self.negative_sampling
    }

    /// Users eligible for sampling as of the last [`refresh`](Self::refresh)
    pub fn sampleable_users(&self) -> &[UserId] {
        &self.sampleable_users
    }

    /// Recompute the sampleable users from the store
    pub fn refresh(&mut self, store: &InteractionStore) {
        self.sampleable_users = store.users().filter(|&u| is_sampleable(store, u)).collect();
    }

    /// Number of [`next_triple`](Self::next_triple) calls that make up one epoch
    ///
    /// For pair permutation this is the length of the current permutation, so
    /// each sampleable interaction is visited exactly once; other strategies
    /// take one step per stored interaction.
    pub fn epoch_len(&self, store: &InteractionStore) -> usize {
        match self.strategy {
            SamplingStrategy::UniformPairWithoutReplacement => self.pair_order.len(),
            _ => store.len(),
        }
    }

    /// Reset per-epoch state; fails with `NoTrainingData` when nothing can be sampled
    pub fn begin_epoch<R: Rng + ?Sized>(
        &mut self,
        store: &InteractionStore,
        rng: &mut R,
    ) -> Result<()> {
        self.refresh(store);
        if self.sampleable_users.is_empty() {
            warn!(
                interactions = store.len(),
                "no user has both a positive and a negative item"
            );
            return Err(LatentRankError::NoTrainingData);
        }

        match self.strategy {
            SamplingStrategy::UniformPairWithoutReplacement => {
                self.shuffle_pairs(store, rng);
            }
            SamplingStrategy::UniformUserWithReplacement => {
                self.pools.iter_mut().for_each(Vec::clear);
                self.pools.resize_with(store.num_users(), Vec::new);
            }
            SamplingStrategy::UniformUserWithoutReplacement
            | SamplingStrategy::UniformPairWithReplacement => {}
        }

        Ok(())
    }

    /// Next triple under the configured strategy
    ///
    /// Requires a successful [`begin_epoch`](Self::begin_epoch) on the same store.
    pub fn next_triple<R: Rng + ?Sized>(&mut self, store: &InteractionStore, rng: &mut R) -> Triple {
        let (user, positive) = match self.strategy {
            SamplingStrategy::UniformUserWithoutReplacement => {
                let user = self.draw_user(rng);
                (user, self.draw_positive(store, user, rng))
            }
            SamplingStrategy::UniformUserWithReplacement => {
                let user = self.draw_user(rng);
                (user, self.draw_from_pool(store, user, rng))
            }
            SamplingStrategy::UniformPairWithoutReplacement => {
                if self.cursor >= self.pair_order.len() {
                    self.shuffle_pairs(store, rng);
                }
                let index = self.pair_order[self.cursor];
                self.cursor += 1;
                store.pairs()[index]
            }
            SamplingStrategy::UniformPairWithReplacement => loop {
                let (user, item) = store.pairs()[rng.gen_range(0..store.len())];
                if is_sampleable(store, user) {
                    break (user, item);
                }
            },
        };

        Triple {
            user,
            positive,
            negative: self.negative_item(store, user, rng),
        }
    }

    /// Negative item for `user` under the configured negative sampling
    ///
    /// `user` must be sampleable, otherwise this never returns.
    pub fn negative_item<R: Rng + ?Sized>(
        &self,
        store: &InteractionStore,
        user: UserId,
        rng: &mut R,
    ) -> ItemId {
        draw_negative(store, user, self.negative_sampling, rng)
    }

    /// Uniformly random sampleable user, `None` if there is none
    pub fn sample_user<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<UserId> {
        self.sampleable_users.choose(rng).copied()
    }

    /// Triple for a fixed user with a uniformly drawn positive
    ///
    /// `None` if the user has no positive or no negative item.
    pub fn sample_for_user<R: Rng + ?Sized>(
        &self,
        store: &InteractionStore,
        user: UserId,
        rng: &mut R,
    ) -> Option<Triple> {
        if !is_sampleable(store, user) {
            return None;
        }

        let positive = store.items_of(user).choose(rng)?;
        Some(Triple {
            user,
            positive,
            negative: self.negative_item(store, user, rng),
        })
    }

    /// Triple involving `item` for a random sampleable user
    ///
    /// If the user likes `item` it is the positive side, otherwise it is the
    /// negative side of one of the user's positives. The returned flag is `true`
    /// when `item` is the positive.
    pub fn sample_for_item<R: Rng + ?Sized>(
        &self,
        store: &InteractionStore,
        item: ItemId,
        rng: &mut R,
    ) -> Option<(Triple, bool)> {
        let user = self.sample_user(rng)?;

        if store.contains(user, item) {
            let triple = Triple {
                user,
                positive: item,
                negative: self.negative_item(store, user, rng),
            };
            Some((triple, true))
        } else {
            let positive = store.items_of(user).choose(rng)?;
            let triple = Triple {
                user,
                positive,
                negative: item,
            };
            Some((triple, false))
        }
    }

    /// `count` independent triples drawn user-first, for loss estimation
    pub fn sample_triples<R: Rng + ?Sized>(
        &self,
        store: &InteractionStore,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Triple>> {
        if self.sampleable_users.is_empty() {
            return Err(LatentRankError::NoTrainingData);
        }

        let mut triples = Vec::with_capacity(count);
        while triples.len() < count {
            let user = self.draw_user(rng);
            if let Some(triple) = self.sample_for_user(store, user, rng) {
                triples.push(triple);
            }
        }
        Ok(triples)
    }

    fn draw_user<R: Rng + ?Sized>(&self, rng: &mut R) -> UserId {
        self.sampleable_users[rng.gen_range(0..self.sampleable_users.len())]
    }

    fn draw_positive<R: Rng + ?Sized>(
        &self,
        store: &InteractionStore,
        user: UserId,
        rng: &mut R,
    ) -> ItemId {
        let items = store.items_of(user);
        items.as_slice()[rng.gen_range(0..items.len())]
    }

    fn draw_from_pool<R: Rng + ?Sized>(
        &mut self,
        store: &InteractionStore,
        user: UserId,
        rng: &mut R,
    ) -> ItemId {
        if user >= self.pools.len() {
            self.pools.resize_with(user + 1, Vec::new);
        }

        let pool = &mut self.pools[user];
        if pool.is_empty() {
            pool.extend(store.items_of(user).iter());
        }

        let index = rng.gen_range(0..pool.len());
        pool.swap_remove(index)
    }

    fn shuffle_pairs<R: Rng + ?Sized>(&mut self, store: &InteractionStore, rng: &mut R) {
        self.pair_order.clear();
        self.pair_order.extend(
            store
                .pairs()
                .iter()
                .enumerate()
                .filter(|&(_, &(user, _))| is_sampleable(store, user))
                .map(|(index, _)| index),
        );
        self.pair_order.shuffle(rng);
        self.cursor = 0;
    }
}
