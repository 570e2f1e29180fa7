//! Error types for complaint RAG

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the complaint RAG system
///
/// Build-time failures abort the indexing run. Query-time failures are
/// returned per request so a batch caller can skip the failing question.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing corpus file, missing stratification column, bad settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Corpus empty after filtering, invalid sample size
    #[error("Data error: {0}")]
    Data(String),

    /// Index missing, unreadable, unwritable or built with another model
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Embedding or generation model unavailable or failed during inference
    #[error("Model error: {0}")]
    Model(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
