//! bpr-train: train BPR-MF on a synthetic implicit-feedback dataset
//!
//! Hyperparameters come from `LATENT_RANK_*` environment variables (or `.env`).
//! The dataset size is controlled by `LATENT_RANK_SYNTHETIC_USERS`,
//! `LATENT_RANK_SYNTHETIC_ITEMS` and `LATENT_RANK_SYNTHETIC_INTERACTIONS`.
//! When `LATENT_RANK_MODEL_PATH` is set the trained model is written there.

use anyhow::{Context, Result};
use latent_rank_bpr::{
    recommend_unseen, BprConfig, BprTrainer, EpochReport, FactorModel, InteractionStore,
    ParallelTrainer, RankingModel, ScoredItem,
};
use latent_rank_core::config::env_key;
use latent_rank_core::{init_logging, load_dotenv, parse_env_var, ConfigLoader, LogConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct Summary {
    trainer: &'static str,
    users: usize,
    items: usize,
    interactions: usize,
    epochs: usize,
    final_loss: Option<f64>,
    final_log_likelihood: Option<f64>,
    state: String,
    recommendations: Vec<ScoredItem>,
}

/// Popularity-skewed random interactions
fn synthetic_store(users: usize, items: usize, interactions: usize, seed: u64) -> InteractionStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let pairs = (0..interactions).map(|_| {
        let user = rng.gen_range(0..users);
        let skew: f64 = rng.gen::<f64>().powi(2);
        let item = ((skew * items as f64) as usize).min(items - 1);
        (user, item)
    });
    InteractionStore::from_pairs(pairs.collect::<Vec<_>>())
}

fn summarize<M: RankingModel>(
    trainer: &'static str,
    model: &M,
    store: &InteractionStore,
    reports: &[EpochReport],
    state: String,
) -> Summary {
    let last = reports.last();
    Summary {
        trainer,
        users: store.users().count(),
        items: store.items().count(),
        interactions: store.len(),
        epochs: reports.len(),
        final_loss: last.map(|r| r.loss),
        final_log_likelihood: last.map(|r| r.log_likelihood),
        state,
        recommendations: recommend_unseen(model, store, 0, 10),
    }
}

fn save_model(model: &FactorModel) -> Result<()> {
    if let Ok(path) = std::env::var(env_key("MODEL_PATH")) {
        model
            .save_to_path(&path)
            .with_context(|| format!("Failed to save model to {}", path))?;
        info!(path = %path, "model saved");
    }
    Ok(())
}

fn main() -> Result<()> {
    load_dotenv();

    let log_config = LogConfig::from_env().context("Failed to load logging configuration")?;
    log_config.validate()?;
    init_logging(&log_config)?;

    let config = BprConfig::from_env().context("Failed to load BPR configuration")?;
    config.validate()?;

    let users: usize = parse_env_var(&env_key("SYNTHETIC_USERS"), 1000)?;
    let items: usize = parse_env_var(&env_key("SYNTHETIC_ITEMS"), 500)?;
    let interactions: usize = parse_env_var(&env_key("SYNTHETIC_INTERACTIONS"), 20_000)?;
    anyhow::ensure!(users > 0 && items > 0, "synthetic dataset needs users and items");

    let store = synthetic_store(users, items, interactions, config.seed.unwrap_or(0));
    info!(
        users,
        items,
        interactions = store.len(),
        factors = config.num_factors,
        sampling = %config.sampling,
        threads = config.num_threads,
        "starting training"
    );

    let summary = if config.num_threads > 1 {
        let mut trainer = ParallelTrainer::new(config, store)?;
        let reports = trainer.train()?;
        let summary = summarize(
            "parallel",
            &trainer,
            trainer.store(),
            &reports,
            trainer.state().to_string(),
        );
        save_model(trainer.model())?;
        summary
    } else {
        let mut trainer = BprTrainer::new(config, store)?;
        let reports = trainer.train()?;
        let summary = summarize(
            "sequential",
            &trainer,
            trainer.store(),
            &reports,
            trainer.state().to_string(),
        );
        save_model(trainer.model())?;
        summary
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
