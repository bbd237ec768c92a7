//! BPR-MF training engine
//!
//! Learns latent user and item factors from positive-only feedback by
//! optimising Bayesian Personalized Ranking with stochastic gradient descent.
//!
//! - [`InteractionStore`]: mutable sparse user-item matrix with mirrored views
//! - [`FactorModel`]: user/item factor matrices and item biases
//! - [`Sampler`]: the four (user|pair) x (with|without replacement) strategies
//! - [`BprTrainer`]: single-threaded training state machine
//! - [`IncrementalUpdater`]: online retraining of touched rows
//! - [`ParallelTrainer`]: lock-free multi-threaded training over a snapshot

pub mod config;
pub mod hogwild;
pub mod id_set;
pub mod incremental;
pub mod model;
pub mod parallel;
pub mod persistence;
pub mod popularity;
pub mod ranking;
pub mod sampler;
pub mod similarity;
pub mod snapshot;
pub mod store;
pub mod trainer;
pub mod update;

#[cfg(test)]
mod tests;

/// Dense internal user id
pub type UserId = usize;
/// Dense internal item id
pub type ItemId = usize;

pub use config::{BprConfig, NegativeSampling, SamplingStrategy};
pub use hogwild::{SharedFactors, UnsynchronizedSharedMatrix};
pub use id_set::SortedIdSet;
pub use incremental::IncrementalUpdater;
pub use model::{FactorModel, FactorParameters, GaussianInit};
pub use parallel::ParallelTrainer;
pub use popularity::MostPopular;
pub use ranking::{recommend, recommend_unseen, RankingModel, ScoredItem, TopK};
pub use sampler::{FeedbackView, Sampler, Triple};
pub use similarity::Correlation;
pub use snapshot::InteractionSnapshot;
pub use store::InteractionStore;
pub use trainer::{BprTrainer, EpochReport, StopHandle, TrainerState};
pub use update::{BprUpdate, UpdateMask};
