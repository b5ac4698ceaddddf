//! Error types for the granule store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Granule store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLx error (connection, query, etc.)
    #[error("Store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A discovered key already exists under the `error` duplicate policy.
    #[error("Granule {0} already exists in the store")]
    DuplicateKey(String),
}
