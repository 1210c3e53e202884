//! Error types for the fan controller

use thiserror::Error;

/// Result type alias for the fan controller
pub type Result<T> = std::result::Result<T, FanControlError>;

/// Main error type for the fan controller
#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("DSM API {api} reported failure (code {code:?})")]
    Api { api: String, code: Option<i64> },

    #[error("DSM API {api} response is missing field `{field}`")]
    MissingField { api: String, field: String },

    #[error("No temperature source available")]
    NoTemperatureSource,
}

