//! # Latent Rank Core
//!
//! Shared building blocks for the latent-rank workspace.
//!
//! This crate provides the ambient pieces every recommender crate relies on:
//! the error taxonomy, environment-driven configuration loading, logging
//! initialisation and small vector math helpers used in the training hot loop.
//!
//! ## Modules
//!
//! - `error`: Error types and the crate-wide `Result` alias
//! - `config`: Configuration loading and validation
//! - `observability`: Structured logging setup
//! - `math`: Vector operations for latent factors

pub mod config;
pub mod error;
pub mod math;
pub mod observability;

// Re-export commonly used types
pub use config::{load_dotenv, parse_env_var, ConfigLoader, ENV_PREFIX};
pub use error::LatentRankError;
pub use math::{cosine_similarity, dot_product, log_sigmoid, sigmoid, squared_norm};
pub use observability::{init_logging, LogConfig, LogFormat};

/// Result type alias for latent-rank operations
pub type Result<T> = std::result::Result<T, LatentRankError>;
