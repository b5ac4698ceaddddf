//! Error types for the discovery pipeline

use std::io;
use thiserror::Error;

/// Granary error type
#[derive(Error, Debug)]
pub enum GranaryError {
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] granary_transport::TransportError),

    #[error("Store error: {0}")]
    Store(#[from] granary_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GranaryError>;
