use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    /// A collaborator method the backend never overrode.
    #[error("{method}() should be implemented by the filter backend")]
    NotImplemented { method: &'static str },

    #[error("{operation} failed: {message}")]
    Fetch {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Unknown field: {term}")]
    UnknownField { term: String },

    #[error("Invalid value: {0}")]
    InvalidValue(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FilterError {
    pub fn fetch(operation: &'static str, message: impl Into<String>) -> Self {
        FilterError::Fetch {
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
