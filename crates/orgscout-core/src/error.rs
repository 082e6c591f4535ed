use thiserror::Error;

/// Top-level error type for the Orgscout gateway.
///
/// Subsystem crates define their own error types and implement
/// `From<ScoutError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ScoutError {
    fn from(err: toml::de::Error) -> Self {
        ScoutError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScoutError {
    fn from(err: toml::ser::Error) -> Self {
        ScoutError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Orgscout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;
