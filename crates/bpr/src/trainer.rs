//! Sequential BPR-MF trainer
//!
//! Owns the interaction store, the factor model and the random source, and
//! drives them through `Uninitialized → Initialized → Training → Converged | Stopped`.
//! Progress is measured on a sample of triples drawn once at initialisation so
//! that losses are comparable across epochs.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::BprConfig;
use crate::incremental::IncrementalUpdater;
use crate::model::{FactorModel, GaussianInit};
use crate::sampler::{Sampler, Triple};
use crate::store::InteractionStore;
use crate::update::{BprUpdate, UpdateMask};
use crate::{ItemId, UserId};
use latent_rank_core::math::log_sigmoid;
use latent_rank_core::{ConfigLoader, LatentRankError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Learn rate multiplier after an epoch that increased the loss
const BOLD_DRIVER_DECREASE: f32 = 0.5;
/// Learn rate multiplier after an epoch that decreased the loss
const BOLD_DRIVER_INCREASE: f32 = 1.05;
/// Lower bound on the frozen loss sample
const MIN_LOSS_SAMPLE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Uninitialized,
    Initialized,
    Training,
    Converged,
    Stopped,
}

impl TrainerState {
    /// No further epochs can run from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainerState::Converged | TrainerState::Stopped)
    }
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainerState::Uninitialized => "uninitialized",
            TrainerState::Initialized => "initialized",
            TrainerState::Training => "training",
            TrainerState::Converged => "converged",
            TrainerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cloneable flag for stopping training between epochs
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the trainer to stop before its next epoch
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Outcome of one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    /// Frozen-sample objective after the epoch
    pub loss: f64,
    /// Mean `ln σ(x_uij)` over the frozen sample
    pub log_likelihood: f64,
    /// Learn rate used for the next epoch
    pub learn_rate: f32,
    /// Number of triples processed
    pub steps: usize,
}

/// Size of the frozen loss sample for a store whose highest user id is `max_user_id`
pub fn loss_sample_size(max_user_id: Option<UserId>) -> usize {
    let scaled = (max_user_id.unwrap_or(0) as f64).sqrt() as usize * 100;
    scaled.max(MIN_LOSS_SAMPLE)
}

/// Pairwise ranking loss plus weighted regularisation over `sample`
///
/// `Σ 1/(1+e^x_uij) + ½ Σ (reg_u‖w_u‖² + reg_i‖h_i‖² + reg_j‖h_j‖² + bias_reg(b_i² + b_j²))`
pub fn sample_objective(model: &FactorModel, update: &BprUpdate, sample: &[Triple]) -> f64 {
    let mut ranking_loss = 0.0;
    let mut complexity = 0.0;

    for &triple in sample {
        let x = BprUpdate::score_difference(model, triple);
        ranking_loss += 1.0 / (1.0 + x.exp());

        let b_i = model.item_bias(triple.positive).unwrap_or(0.0) as f64;
        let b_j = model.item_bias(triple.negative).unwrap_or(0.0) as f64;
        complexity += update.reg_u as f64 * model.user_squared_norm(triple.user) as f64
            + update.reg_i as f64 * model.item_squared_norm(triple.positive) as f64
            + update.reg_j as f64 * model.item_squared_norm(triple.negative) as f64
            + update.bias_reg as f64 * (b_i * b_i + b_j * b_j);
    }

    ranking_loss + 0.5 * complexity
}

/// Mean log-likelihood `ln σ(x_uij)` over `sample`; 0 for an empty sample
pub fn sample_log_likelihood(model: &FactorModel, sample: &[Triple]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let total: f64 = sample
        .iter()
        .map(|&triple| log_sigmoid(BprUpdate::score_difference(model, triple)))
        .sum();
    total / sample.len() as f64
}

/// Master random source: seeded when configured, otherwise from OS entropy
pub(crate) fn master_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Draw the frozen loss sample; empty when nothing is sampleable
pub(crate) fn draw_loss_sample(
    sampler: &mut Sampler,
    store: &InteractionStore,
    rng: &mut StdRng,
) -> Result<Vec<Triple>> {
    sampler.refresh(store);
    if sampler.sampleable_users().is_empty() {
        warn!("no sampleable users, loss sample is empty");
        return Ok(Vec::new());
    }

    sampler.sample_triples(store, loss_sample_size(store.max_user_id()), rng)
}

/// Learning-rate and convergence bookkeeping shared by the sequential and parallel trainers
#[derive(Debug, Clone)]
pub(crate) struct EpochSchedule {
    pub(crate) bold_driver: bool,
    pub(crate) convergence_threshold: f64,
    pub(crate) last_loss: Option<f64>,
}

impl EpochSchedule {
    pub(crate) fn new(config: &BprConfig) -> Self {
        Self {
            bold_driver: config.bold_driver,
            convergence_threshold: config.convergence_threshold,
            last_loss: None,
        }
    }

    /// Record `loss`, adapt `update.learn_rate`, and report convergence
    pub(crate) fn observe(&mut self, loss: f64, update: &mut BprUpdate) -> bool {
        let previous = self.last_loss.replace(loss);
        let Some(previous) = previous else {
            return false;
        };

        if self.bold_driver {
            if loss > previous {
                update.learn_rate *= BOLD_DRIVER_DECREASE;
                warn!(
                    previous,
                    loss,
                    learn_rate = update.learn_rate,
                    "loss increased, halving learn rate"
                );
            } else {
                update.learn_rate *= BOLD_DRIVER_INCREASE;
            }
        }

        if self.convergence_threshold > 0.0 {
            let scale = previous.abs().max(f64::EPSILON);
            let relative = (previous - loss).abs() / scale;
            return relative < self.convergence_threshold;
        }

        false
    }
}

/// Single-threaded BPR-MF trainer
#[derive(Debug)]
pub struct BprTrainer {
    config: BprConfig,
    store: InteractionStore,
    model: FactorModel,
    sampler: Sampler,
    update: BprUpdate,
    schedule: EpochSchedule,
    rng: StdRng,
    state: TrainerState,
    loss_sample: Vec<Triple>,
    epoch: usize,
    stop: StopHandle,
}

impl BprTrainer {
    /// Create a trainer over `store`; the configuration is validated first
    pub fn new(config: BprConfig, store: InteractionStore) -> Result<Self> {
        config.validate()?;

        let rng = master_rng(config.seed);
        let init = GaussianInit::new(config.init_mean, config.init_stddev)?;

        Ok(Self {
            model: FactorModel::new(config.num_factors, init),
            sampler: Sampler::new(config.sampling, config.negative_sampling),
            update: BprUpdate::from_config(&config),
            schedule: EpochSchedule::new(&config),
            config,
            store,
            rng,
            state: TrainerState::Uninitialized,
            loss_sample: Vec::new(),
            epoch: 0,
            stop: StopHandle::new(),
        })
    }

    pub fn config(&self) -> &BprConfig {
        &self.config
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn model(&self) -> &FactorModel {
        &self.model
    }

    pub fn store(&self) -> &InteractionStore {
        &self.store
    }

    /// Epochs completed so far
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Current (possibly bold-driver adapted) learn rate
    pub fn learn_rate(&self) -> f32 {
        self.update.learn_rate
    }

    /// Triples the objective is evaluated on
    pub fn loss_sample(&self) -> &[Triple] {
        &self.loss_sample
    }

    /// Handle that stops training before the next epoch when triggered
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Initialise factor rows for every id in the store and freeze the loss sample
    pub fn init_model(&mut self) -> Result<()> {
        if self.state.is_terminal() || self.state == TrainerState::Training {
            return Err(LatentRankError::invalid_state("initialise model", self.state));
        }

        self.model = FactorModel::initialized(
            self.config.num_factors,
            self.model.init(),
            self.store.num_users(),
            self.store.num_items(),
            &mut self.rng,
        );

        self.loss_sample = draw_loss_sample(&mut self.sampler, &self.store, &mut self.rng)?;

        self.update = BprUpdate::from_config(&self.config);
        self.schedule = EpochSchedule::new(&self.config);
        self.epoch = 0;
        self.state = TrainerState::Initialized;

        debug!(
            users = self.model.num_users(),
            items = self.model.num_items(),
            loss_sample = self.loss_sample.len(),
            "initialised factor model"
        );
        Ok(())
    }

    /// Run exactly one epoch
    ///
    /// An epoch is `|interactions|` steps, except under pair permutation where it
    /// is one pass over the sampleable interactions.
    pub fn iterate(&mut self) -> Result<EpochReport> {
        match self.state {
            TrainerState::Initialized | TrainerState::Training => {}
            state => return Err(LatentRankError::invalid_state("iterate", state)),
        }

        self.sampler.begin_epoch(&self.store, &mut self.rng)?;
        self.state = TrainerState::Training;

        let steps = self.sampler.epoch_len(&self.store);
        for _ in 0..steps {
            let triple = self.sampler.next_triple(&self.store, &mut self.rng);
            self.update.apply(&mut self.model, triple, UpdateMask::ALL);
        }
        self.epoch += 1;

        let loss = self.compute_loss();
        let log_likelihood = sample_log_likelihood(&self.model, &self.loss_sample);
        if self.schedule.observe(loss, &mut self.update) {
            self.state = TrainerState::Converged;
        }

        info!(
            epoch = self.epoch,
            loss,
            log_likelihood,
            learn_rate = self.update.learn_rate,
            state = %self.state,
            "epoch complete"
        );

        Ok(EpochReport {
            epoch: self.epoch,
            loss,
            log_likelihood,
            learn_rate: self.update.learn_rate,
            steps,
        })
    }

    /// Initialise if needed, then run up to `num_epochs` epochs
    ///
    /// Returns early when the loss converges or a stop is requested.
    pub fn train(&mut self) -> Result<Vec<EpochReport>> {
        if self.state == TrainerState::Uninitialized {
            self.init_model()?;
        }

        let mut reports = Vec::with_capacity(self.config.num_epochs);
        for _ in 0..self.config.num_epochs {
            if self.stop.is_stop_requested() {
                self.stop();
                break;
            }

            reports.push(self.iterate()?);
            if self.state == TrainerState::Converged {
                info!(epoch = self.epoch, "training converged");
                break;
            }
        }

        Ok(reports)
    }

    /// Move to `Stopped`; no further epochs can run
    pub fn stop(&mut self) {
        if self.state != TrainerState::Stopped {
            info!(epoch = self.epoch, "training stopped");
        }
        self.state = TrainerState::Stopped;
    }

    /// Objective over the frozen sample
    pub fn compute_loss(&self) -> f64 {
        sample_objective(&self.model, &self.update, &self.loss_sample)
    }

    pub fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
        self.model.predict(user, item)
    }

    /// Updater for feedback arriving after initialisation
    pub fn incremental(&mut self) -> Result<IncrementalUpdater<'_>> {
        if self.state == TrainerState::Uninitialized {
            return Err(LatentRankError::invalid_state(
                "apply incremental feedback",
                self.state,
            ));
        }

        Ok(IncrementalUpdater::new(
            &mut self.store,
            &mut self.model,
            &mut self.sampler,
            &mut self.rng,
            self.update,
            self.config.update_users,
            self.config.update_items,
        ))
    }

    /// Give up the trainer, keeping the store and learned model
    pub fn into_parts(self) -> (InteractionStore, FactorModel) {
        (self.store, self.model)
    }
}
