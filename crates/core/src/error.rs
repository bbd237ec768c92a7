//! Error types shared across the workspace

/// Errors raised by the recommender core.
///
/// Predicting for an unknown user or item is not an error: scoring APIs return
/// `None` so ranking callers can keep iterating over other candidates.
#[derive(Debug, thiserror::Error)]
pub enum LatentRankError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Inconsistent interaction store: {0}")]
    InconsistentStore(String),

    #[error("Cannot {operation} while trainer is {state}")]
    InvalidState { operation: String, state: String },

    #[error("No user has both a positive and a negative item to sample")]
    NoTrainingData,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LatentRankError {
    /// Configuration error attached to an environment key
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    pub fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Whether the error leaves the caller's data in a state that must not be used further.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::InconsistentStore(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_carries_key() {
        let err = LatentRankError::config("bad value", "LATENT_RANK_NUM_FACTORS");
        match err {
            LatentRankError::ConfigurationError { message, key } => {
                assert_eq!(message, "bad value");
                assert_eq!(key.as_deref(), Some("LATENT_RANK_NUM_FACTORS"));
            }
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = LatentRankError::dimension_mismatch("item bias length", 5, 4);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch in item bias length: expected 5, got 4"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = LatentRankError::invalid_state("iterate", "stopped");
        assert_eq!(err.to_string(), "Cannot iterate while trainer is stopped");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: LatentRankError = io.into();
        assert!(matches!(err, LatentRankError::Io(_)));
    }
}
