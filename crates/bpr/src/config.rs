//! Training hyperparameters
//!
//! # Environment Variables
//!
//! All optional; unset variables keep the defaults below.
//!
//! - `LATENT_RANK_NUM_FACTORS` (default: 10)
//! - `LATENT_RANK_LEARN_RATE` (default: 0.05)
//! - `LATENT_RANK_REG_U` / `LATENT_RANK_REG_I` / `LATENT_RANK_REG_J`
//!   (defaults: 0.0025 / 0.0025 / 0.00025)
//! - `LATENT_RANK_BIAS_REG` (default: 1.0)
//! - `LATENT_RANK_NUM_EPOCHS` (default: 30)
//! - `LATENT_RANK_SAMPLING` (default: "uniform-user-without-replacement")
//! - `LATENT_RANK_NEGATIVE_SAMPLING` (default: "uniform")
//! - `LATENT_RANK_INIT_MEAN` / `LATENT_RANK_INIT_STDDEV` (defaults: 0.0 / 0.1)
//! - `LATENT_RANK_NUM_THREADS` (default: available parallelism)
//! - `LATENT_RANK_BOLD_DRIVER` (default: false)
//! - `LATENT_RANK_CONVERGENCE_THRESHOLD` (default: 0.0, disabled)
//! - `LATENT_RANK_UPDATE_USERS` / `LATENT_RANK_UPDATE_ITEMS` (default: true)
//! - `LATENT_RANK_SEED` (default: unset, seeded from OS entropy)
//!
//! # Example
//!
//! ```bash
//! export LATENT_RANK_NUM_FACTORS="32"
//! export LATENT_RANK_SAMPLING="uniform-pair-with-replacement"
//! export LATENT_RANK_SEED="42"
//! ```

use latent_rank_core::config::{env_key, parse_env_var, parse_optional_env_var, ConfigLoader};
use latent_rank_core::LatentRankError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How (user, positive item) pairs are drawn for each training triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingStrategy {
    /// Uniform user among those with a valid positive and negative, then a uniform item of theirs
    UniformUserWithoutReplacement,
    /// Like `UniformUserWithoutReplacement`, but each user's positives are drawn
    /// from a per-epoch pool that is refilled when exhausted
    UniformUserWithReplacement,
    /// Walk a shuffled permutation of all interactions
    UniformPairWithoutReplacement,
    /// Draw an interaction index uniformly at every step
    UniformPairWithReplacement,
}

impl SamplingStrategy {
    pub const ALL: [SamplingStrategy; 4] = [
        SamplingStrategy::UniformUserWithoutReplacement,
        SamplingStrategy::UniformUserWithReplacement,
        SamplingStrategy::UniformPairWithoutReplacement,
        SamplingStrategy::UniformPairWithReplacement,
    ];

    /// `true` for strategies optimising the average per-user loss,
    /// `false` for those optimising the global pairwise loss
    pub fn is_user_centric(&self) -> bool {
        matches!(
            self,
            SamplingStrategy::UniformUserWithoutReplacement
                | SamplingStrategy::UniformUserWithReplacement
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::UniformUserWithoutReplacement => "uniform-user-without-replacement",
            SamplingStrategy::UniformUserWithReplacement => "uniform-user-with-replacement",
            SamplingStrategy::UniformPairWithoutReplacement => "uniform-pair-without-replacement",
            SamplingStrategy::UniformPairWithReplacement => "uniform-pair-with-replacement",
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        SamplingStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown sampling strategy '{}'. Must be one of: {}",
                    s,
                    SamplingStrategy::ALL
                        .iter()
                        .map(SamplingStrategy::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// How negative items are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegativeSampling {
    /// Uniform over all item ids
    Uniform,
    /// Proportional to item popularity (weighted BPR)
    Popularity,
}

impl FromStr for NegativeSampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(NegativeSampling::Uniform),
            "popularity" => Ok(NegativeSampling::Popularity),
            other => Err(format!(
                "unknown negative sampling '{}'. Must be one of: uniform, popularity",
                other
            )),
        }
    }
}

/// BPR-MF hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BprConfig {
    /// Number of latent factors
    pub num_factors: usize,
    /// SGD step size
    pub learn_rate: f32,
    /// Regularisation of user factors
    pub reg_u: f32,
    /// Regularisation of positive item factors
    pub reg_i: f32,
    /// Regularisation of negative item factors
    pub reg_j: f32,
    /// Regularisation of item biases
    pub bias_reg: f32,
    /// Epochs run by `train`
    pub num_epochs: usize,
    pub sampling: SamplingStrategy,
    pub negative_sampling: NegativeSampling,
    /// Mean of the Gaussian used for row initialisation
    pub init_mean: f32,
    /// Standard deviation of the Gaussian used for row initialisation
    pub init_stddev: f32,
    /// Worker count for parallel training
    pub num_threads: usize,
    /// Adapt the learn rate after every epoch
    pub bold_driver: bool,
    /// Relative loss change below which training is considered converged; 0 disables
    pub convergence_threshold: f64,
    /// Retrain user rows on incremental feedback
    pub update_users: bool,
    /// Retrain item rows on incremental feedback
    pub update_items: bool,
    /// Master seed; `None` draws one from OS entropy
    pub seed: Option<u64>,
}

impl Default for BprConfig {
    fn default() -> Self {
        Self {
            num_factors: 10,
            learn_rate: 0.05,
            reg_u: 0.0025,
            reg_i: 0.0025,
            reg_j: 0.00025,
            bias_reg: 1.0,
            num_epochs: 30,
            sampling: SamplingStrategy::UniformUserWithoutReplacement,
            negative_sampling: NegativeSampling::Uniform,
            init_mean: 0.0,
            init_stddev: 0.1,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            bold_driver: false,
            convergence_threshold: 0.0,
            update_users: true,
            update_items: true,
            seed: None,
        }
    }
}

impl BprConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of latent factors.
    pub fn num_factors(mut self, num_factors: usize) -> Self {
        self.num_factors = num_factors;
        self
    }

    /// Set the learning rate.
    pub fn learn_rate(mut self, learn_rate: f32) -> Self {
        self.learn_rate = learn_rate;
        self
    }

    /// Set the three factor regularisers (user, positive item, negative item).
    pub fn regularization(mut self, reg_u: f32, reg_i: f32, reg_j: f32) -> Self {
        self.reg_u = reg_u;
        self.reg_i = reg_i;
        self.reg_j = reg_j;
        self
    }

    /// Set the item bias regulariser.
    pub fn bias_reg(mut self, bias_reg: f32) -> Self {
        self.bias_reg = bias_reg;
        self
    }

    /// Set the number of epochs to run per `train` call.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the sampling strategy.
    pub fn sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the negative item distribution.
    pub fn negative_sampling(mut self, negative_sampling: NegativeSampling) -> Self {
        self.negative_sampling = negative_sampling;
        self
    }

    /// Set the Gaussian used to initialise factor rows.
    pub fn init(mut self, mean: f32, stddev: f32) -> Self {
        self.init_mean = mean;
        self.init_stddev = stddev;
        self
    }

    /// Set number of threads to be used.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Enable or disable the bold driver learn-rate heuristic.
    pub fn bold_driver(mut self, enabled: bool) -> Self {
        self.bold_driver = enabled;
        self
    }

    /// Set the relative loss change treated as convergence.
    pub fn convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Choose which rows incremental updates retrain.
    pub fn incremental_updates(mut self, users: bool, items: bool) -> Self {
        self.update_users = users;
        self.update_items = items;
        self
    }

    /// Set the master seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl ConfigLoader for BprConfig {
    fn from_env() -> Result<Self, LatentRankError> {
        let defaults = BprConfig::default();

        let sampling = match std::env::var(env_key("SAMPLING")) {
            Ok(raw) => raw
                .parse::<SamplingStrategy>()
                .map_err(|e| LatentRankError::config(e, &env_key("SAMPLING")))?,
            Err(_) => defaults.sampling,
        };

        let negative_sampling = match std::env::var(env_key("NEGATIVE_SAMPLING")) {
            Ok(raw) => raw
                .parse::<NegativeSampling>()
                .map_err(|e| LatentRankError::config(e, &env_key("NEGATIVE_SAMPLING")))?,
            Err(_) => defaults.negative_sampling,
        };

        Ok(Self {
            num_factors: parse_env_var(&env_key("NUM_FACTORS"), defaults.num_factors)?,
            learn_rate: parse_env_var(&env_key("LEARN_RATE"), defaults.learn_rate)?,
            reg_u: parse_env_var(&env_key("REG_U"), defaults.reg_u)?,
            reg_i: parse_env_var(&env_key("REG_I"), defaults.reg_i)?,
            reg_j: parse_env_var(&env_key("REG_J"), defaults.reg_j)?,
            bias_reg: parse_env_var(&env_key("BIAS_REG"), defaults.bias_reg)?,
            num_epochs: parse_env_var(&env_key("NUM_EPOCHS"), defaults.num_epochs)?,
            sampling,
            negative_sampling,
            init_mean: parse_env_var(&env_key("INIT_MEAN"), defaults.init_mean)?,
            init_stddev: parse_env_var(&env_key("INIT_STDDEV"), defaults.init_stddev)?,
            num_threads: parse_env_var(&env_key("NUM_THREADS"), defaults.num_threads)?,
            bold_driver: parse_env_var(&env_key("BOLD_DRIVER"), defaults.bold_driver)?,
            convergence_threshold: parse_env_var(
                &env_key("CONVERGENCE_THRESHOLD"),
                defaults.convergence_threshold,
            )?,
            update_users: parse_env_var(&env_key("UPDATE_USERS"), defaults.update_users)?,
            update_items: parse_env_var(&env_key("UPDATE_ITEMS"), defaults.update_items)?,
            seed: parse_optional_env_var(&env_key("SEED"))?,
        })
    }

    fn validate(&self) -> Result<(), LatentRankError> {
        if self.num_factors == 0 {
            return Err(LatentRankError::config(
                "num_factors must be greater than 0",
                &env_key("NUM_FACTORS"),
            ));
        }

        if !self.learn_rate.is_finite() || self.learn_rate <= 0.0 {
            return Err(LatentRankError::config(
                format!("learn_rate must be positive and finite, got {}", self.learn_rate),
                &env_key("LEARN_RATE"),
            ));
        }

        for (name, value) in [
            ("REG_U", self.reg_u),
            ("REG_I", self.reg_i),
            ("REG_J", self.reg_j),
            ("BIAS_REG", self.bias_reg),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LatentRankError::config(
                    format!("{} must be non-negative and finite, got {}", name.to_lowercase(), value),
                    &env_key(name),
                ));
            }
        }

        if !self.init_mean.is_finite() {
            return Err(LatentRankError::config(
                "init_mean must be finite",
                &env_key("INIT_MEAN"),
            ));
        }

        if !self.init_stddev.is_finite() || self.init_stddev < 0.0 {
            return Err(LatentRankError::config(
                format!("init_stddev must be non-negative and finite, got {}", self.init_stddev),
                &env_key("INIT_STDDEV"),
            ));
        }

        if self.num_threads == 0 {
            return Err(LatentRankError::config(
                "num_threads must be greater than 0",
                &env_key("NUM_THREADS"),
            ));
        }

        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(LatentRankError::config(
                "convergence_threshold must be non-negative and finite",
                &env_key("CONVERGENCE_THRESHOLD"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_bpr_config_default() {
        let config = BprConfig::default();
        assert_eq!(config.num_factors, 10);
        assert_eq!(config.learn_rate, 0.05);
        assert_eq!(config.sampling, SamplingStrategy::UniformUserWithoutReplacement);
        assert!(config.num_threads > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = BprConfig::new()
            .num_factors(4)
            .learn_rate(0.1)
            .regularization(0.01, 0.02, 0.03)
            .sampling(SamplingStrategy::UniformPairWithReplacement)
            .num_threads(2)
            .seed(9);

        assert_eq!(config.num_factors, 4);
        assert_eq!(config.reg_j, 0.03);
        assert_eq!(config.sampling, SamplingStrategy::UniformPairWithReplacement);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn test_sampling_strategy_parse_round_trip() {
        for strategy in SamplingStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<SamplingStrategy>().unwrap(), strategy);
        }
        assert_eq!(
            "UNIFORM_PAIR_WITH_REPLACEMENT".parse::<SamplingStrategy>().unwrap(),
            SamplingStrategy::UniformPairWithReplacement
        );
        assert!("uniform".parse::<SamplingStrategy>().is_err());
    }

    #[test]
    fn test_user_centric_split() {
        assert!(SamplingStrategy::UniformUserWithReplacement.is_user_centric());
        assert!(!SamplingStrategy::UniformPairWithoutReplacement.is_user_centric());
    }

    #[test]
    fn test_validation_rejects_zero_factors() {
        let config = BprConfig::default().num_factors(0);
        match config.validate().unwrap_err() {
            LatentRankError::ConfigurationError { key, .. } => {
                assert_eq!(key.as_deref(), Some("LATENT_RANK_NUM_FACTORS"));
            }
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_validation_rejects_negative_regularization() {
        let config = BprConfig::default().regularization(0.1, -0.1, 0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_learn_rate_and_stddev() {
        assert!(BprConfig::default().learn_rate(0.0).validate().is_err());
        assert!(BprConfig::default().learn_rate(f32::NAN).validate().is_err());
        assert!(BprConfig::default().init(0.0, -1.0).validate().is_err());
        assert!(BprConfig::default().num_threads(0).validate().is_err());
    }

    #[test]
    fn test_bpr_config_from_env() {
        env::set_var("LATENT_RANK_NUM_FACTORS", "16");
        env::set_var("LATENT_RANK_SAMPLING", "uniform-pair-without-replacement");
        env::set_var("LATENT_RANK_NEGATIVE_SAMPLING", "popularity");
        env::set_var("LATENT_RANK_SEED", "1234");

        let config = BprConfig::from_env().unwrap();
        assert_eq!(config.num_factors, 16);
        assert_eq!(config.sampling, SamplingStrategy::UniformPairWithoutReplacement);
        assert_eq!(config.negative_sampling, NegativeSampling::Popularity);
        assert_eq!(config.seed, Some(1234));

        env::remove_var("LATENT_RANK_NUM_FACTORS");
        env::remove_var("LATENT_RANK_SAMPLING");
        env::remove_var("LATENT_RANK_NEGATIVE_SAMPLING");
        env::remove_var("LATENT_RANK_SEED");
    }
}
