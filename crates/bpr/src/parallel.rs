//! Hogwild-style parallel BPR-MF trainer
//!
//! Each epoch freezes the store into an
//! [`InteractionSnapshot`](crate::snapshot::InteractionSnapshot), shuffles the
//! interaction indices, and hands one contiguous block to each worker. Workers
//! run uniform-pair-without-replacement steps over their block against the same
//! [`SharedFactors`](crate::hogwild::SharedFactors) with no per-step locking.
//! Every worker owns a `StdRng` seeded from the trainer's master RNG.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::config::BprConfig;
use crate::incremental::IncrementalUpdater;
use crate::model::{FactorModel, GaussianInit};
use crate::sampler::{draw_negative, is_sampleable, Sampler, Triple};
use crate::store::InteractionStore;
use crate::trainer::{
    draw_loss_sample, master_rng, sample_log_likelihood, sample_objective, EpochReport,
    EpochSchedule, StopHandle, TrainerState,
};
use crate::update::{BprUpdate, UpdateMask};
use crate::{ItemId, UserId};
use latent_rank_core::{ConfigLoader, LatentRankError, Result};

/// Multi-threaded BPR-MF trainer over a shared model
#[derive(Debug)]
pub struct ParallelTrainer {
    config: BprConfig,
    store: InteractionStore,
    model: FactorModel,
    sampler: Sampler,
    update: BprUpdate,
    schedule: EpochSchedule,
    rng: StdRng,
    pool: ThreadPool,
    state: TrainerState,
    loss_sample: Vec<Triple>,
    epoch: usize,
    stop: StopHandle,
}

impl ParallelTrainer {
    /// Create a trainer with a dedicated pool of `config.num_threads` workers
    pub fn new(config: BprConfig, store: InteractionStore) -> Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|index| format!("bpr-worker-{}", index))
            .build()
            .map_err(|e| LatentRankError::ThreadPool(e.to_string()))?;
        let init = GaussianInit::new(config.init_mean, config.init_stddev)?;

        Ok(Self {
            model: FactorModel::new(config.num_factors, init),
            sampler: Sampler::new(config.sampling, config.negative_sampling),
            update: BprUpdate::from_config(&config),
            schedule: EpochSchedule::new(&config),
            rng: master_rng(config.seed),
            config,
            store,
            pool,
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

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn learn_rate(&self) -> f32 {
        self.update.learn_rate
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn loss_sample(&self) -> &[Triple] {
        &self.loss_sample
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

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
        Ok(())
    }

    /// One epoch: every sampleable interaction is visited once across all workers
    pub fn iterate(&mut self) -> Result<EpochReport> {
        match self.state {
            TrainerState::Initialized | TrainerState::Training => {}
            state => return Err(LatentRankError::invalid_state("iterate", state)),
        }

        let snapshot = self.store.snapshot();
        let mut order: Vec<usize> = (0..snapshot.len())
            .filter(|&index| is_sampleable(&snapshot, snapshot.pair(index).0))
            .collect();
        if order.is_empty() {
            return Err(LatentRankError::NoTrainingData);
        }
        order.shuffle(&mut self.rng);
        self.state = TrainerState::Training;

        let num_workers = self.pool.current_num_threads().max(1);
        let block_size = order.len().div_ceil(num_workers);
        let seeds: Vec<u64> = (0..num_workers).map(|_| self.rng.gen()).collect();

        let update = self.update;
        let negative_sampling = self.config.negative_sampling;
        let shared = self.model.shared()?;
        let snapshot = &snapshot;

        self.pool.scope(|scope| {
            for (worker, (block, &seed)) in order.chunks(block_size).zip(&seeds).enumerate() {
                scope.spawn(move |_| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let mut params = shared;
                    for &index in block {
                        let (user, positive) = snapshot.pair(index);
                        let negative =
                            draw_negative(snapshot, user, negative_sampling, &mut rng);
                        let triple = Triple {
                            user,
                            positive,
                            negative,
                        };
                        update.apply(&mut params, triple, UpdateMask::ALL);
                    }
                    debug!(worker, steps = block.len(), "worker finished block");
                });
            }
        });

        let steps = order.len();
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
            workers = num_workers,
            state = %self.state,
            "parallel epoch complete"
        );

        Ok(EpochReport {
            epoch: self.epoch,
            loss,
            log_likelihood,
            learn_rate: self.update.learn_rate,
            steps,
        })
    }

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

    pub fn stop(&mut self) {
        if self.state != TrainerState::Stopped {
            info!(epoch = self.epoch, "training stopped");
        }
        self.state = TrainerState::Stopped;
    }

    pub fn compute_loss(&self) -> f64 {
        sample_objective(&self.model, &self.update, &self.loss_sample)
    }

    pub fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
        self.model.predict(user, item)
    }

    /// Updater for feedback arriving between parallel epochs
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

    pub fn into_parts(self) -> (InteractionStore, FactorModel) {
        (self.store, self.model)
    }
}
