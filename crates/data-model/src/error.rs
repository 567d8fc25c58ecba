//! Error types for the data-model crate.
//!
//! Construction errors are fatal and local to the call that produced them:
//! a DataModel is either built completely or not at all.

use thiserror::Error;

use crate::types::EntityKind;

/// Errors that can occur while ingesting ratings and building a DataModel
#[derive(Error, Debug)]
pub enum DataModelError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Line in a ratings file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A rating references a code the frozen model does not know
    #[error("Unknown {kind} code: {code}")]
    UnknownCode { kind: EntityKind, code: String },

    /// Two ratings share the same (user, item) pair
    #[error("Duplicate rating for user {user_code} and item {item_code}")]
    DuplicateRating {
        user_code: String,
        item_code: String,
    },

    /// Rating value is NaN or infinite
    #[error("Non-finite rating {value} for user {user_code} and item {item_code}")]
    NonFiniteRating {
        user_code: String,
        item_code: String,
        value: f64,
    },

    /// Rating value falls outside the declared rating range
    #[error("Rating {value} for user {user_code} and item {item_code} is outside [{min}, {max}]")]
    OutOfRange {
        user_code: String,
        item_code: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The declared rating range is empty or not finite
    #[error("Invalid rating range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    /// Test split fraction must lie in [0, 1)
    #[error("Invalid test split fraction: {0}")]
    InvalidSplit(f64),
}

impl DataModelError {
    /// True for errors caused by malformed or contradictory construction data
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            DataModelError::UnknownCode { .. }
                | DataModelError::DuplicateRating { .. }
                | DataModelError::NonFiniteRating { .. }
                | DataModelError::OutOfRange { .. }
                | DataModelError::InvalidRange { .. }
                | DataModelError::InvalidSplit(_)
                | DataModelError::ParseError { .. }
        )
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataModelError>;
