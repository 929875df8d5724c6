//! Pipe error types.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by pipe constructors and pipe shutdown.
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Invalid pipe configuration: {0}")]
    Configuration(String),

    #[error("Pipe close failed: {0}")]
    Close(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Internal pipe error: {0}")]
    Internal(String),
}

impl PipeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PipeError::Configuration(message.into())
    }
}

impl From<serde_json::Error> for PipeError {
    fn from(err: serde_json::Error) -> Self {
        PipeError::Configuration(err.to_string())
    }
}
