//! Error types for provider transports.

use thiserror::Error;

/// Transport operation result type.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while listing a remote provider.
///
/// Every variant names the protocol and the location that failed. Transport
/// errors are never swallowed; they abort the discovery run that triggered
/// them.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request or response failure.
    #[error("HTTP request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// SFTP operation failure.
    #[error("SFTP operation failed for {path}: {source}")]
    Sftp {
        path: String,
        #[source]
        source: ssh2::Error,
    },

    /// S3 listing failure.
    #[error("S3 listing failed for {location}: {message}")]
    S3 { location: String, message: String },

    /// TCP connection failure.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Authentication failure.
    #[error("Authentication failed for {user}@{host}: {message}")]
    Auth {
        user: String,
        host: String,
        message: String,
    },

    /// HTTP client construction failure.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Listing-page selector construction failure.
    #[error("Failed to build listing selector: {0}")]
    Selector(String),
}
