use thiserror::Error;

use acd_core::AcdError;

/// Errors that may occur when driving the passcode engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid date/time input: {0}")]
    InvalidTimestampInput(String),
    #[error("calculation failed: {0}")]
    ComputationFailure(String),
    #[error("no edit in progress")]
    NotEditing,
    #[error("engine is shutting down")]
    ShuttingDown,
}

impl From<AcdError> for EngineError {
    fn from(value: AcdError) -> Self {
        match value {
            AcdError::InvalidTimestampInput(raw) => EngineError::InvalidTimestampInput(raw),
            other => EngineError::ComputationFailure(other.to_string()),
        }
    }
}
