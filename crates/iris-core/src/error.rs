use thiserror::Error;

/// Top-level error type for the iris system.
///
/// Each variant wraps a subsystem-specific failure as a message. Subsystems
/// construct their own variant directly so that the `?` operator works
/// across crate boundaries via the shared [`Result`] alias.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for IrisError {
    fn from(err: toml::de::Error) -> Self {
        IrisError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for IrisError {
    fn from(err: toml::ser::Error) -> Self {
        IrisError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for IrisError {
    fn from(err: serde_json::Error) -> Self {
        IrisError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for iris operations.
pub type Result<T> = std::result::Result<T, IrisError>;
