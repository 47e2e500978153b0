use thiserror::Error;

/// Result type used across the ACD core crate.
pub type Result<T> = std::result::Result<T, AcdError>;

/// Canonical error representation shared by the engine and the CLI.
#[derive(Debug, Error)]
pub enum AcdError {
    #[error("Invalid date/time input: {0}")]
    InvalidTimestampInput(String),

    #[error("unknown formula variant: {0}")]
    InvalidVariant(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("general error: {0}")]
    General(String),
}

impl From<serde_json::Error> for AcdError {
    fn from(err: serde_json::Error) -> Self {
        AcdError::Serialization(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("environment variable {key} could not be read")]
    Unreadable {
        key: String,
        #[source]
        source: std::env::VarError,
    },
}
