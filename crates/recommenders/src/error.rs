//! Error types for training and configuration.

use data_model::DataModelError;
use parallelizer::ParallelError;
use thiserror::Error;

/// Errors raised by recommenders
///
/// Undefined predictions are not errors: `predict` returns NaN for them.
#[derive(Error, Debug)]
pub enum RecommenderError {
    /// A hyperparameter is out of its valid domain
    #[error("Invalid value for {parameter}: {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },

    /// A training sweep failed; the model is left in an unspecified state
    #[error("Training sweep failed: {0}")]
    Parallel(#[from] ParallelError),

    #[error("Data model error: {0}")]
    DataModel(#[from] DataModelError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecommenderError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        RecommenderError::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, RecommenderError>;
