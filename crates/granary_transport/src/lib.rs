//! Provider transport adapters.
//!
//! Each adapter lists the immediate children of one remote location and
//! reports the raw markers the provider exposes (identity tag, modification
//! time, size). Protocol selection happens once, when the adapter is built
//! from provider configuration; after that callers hold a [`Transport`]
//! trait object or match on the [`Adapter`] enum and never inspect protocol
//! strings again.

mod error;
mod http;
mod s3;
mod sftp;

pub use error::{Result, TransportError};
pub use http::{HttpConfig, HttpTransport};
pub use s3::{create_client, S3Options, S3Transport};
pub use sftp::{SftpConfig, SftpTransport, SFTP_ETAG};

use async_trait::async_trait;

/// One directory entry as reported by a provider, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Base name (last path component).
    pub name: String,
    /// Full location of the entry (URL or absolute path).
    pub key: String,
    /// Identity tag, verbatim from the provider.
    pub etag: Option<String>,
    /// Modification time, seconds since the Unix epoch.
    pub last_modified: Option<i64>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// Whether the provider reports this entry as a directory.
    pub is_dir: bool,
}

impl RawEntry {
    /// True when the provider reported at least one file marker.
    pub fn has_markers(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// A protocol adapter that can list the children of a remote location.
#[async_trait]
pub trait Transport: Send + Sync {
    /// List the immediate children of `location`.
    async fn list_children(&self, location: &str) -> Result<Vec<RawEntry>>;
}

/// Transport selected once from provider configuration.
///
/// HTTP and SFTP walk a directory tree; S3 lists a flat key prefix. The
/// discovery engine matches on the variant to pick the traversal.
pub enum Adapter {
    Http(HttpTransport),
    Sftp(SftpTransport),
    S3(S3Transport),
}

impl Adapter {
    /// Protocol label for logging.
    pub fn protocol(&self) -> &'static str {
        match self {
            Adapter::Http(_) => "http",
            Adapter::Sftp(_) => "sftp",
            Adapter::S3(_) => "s3",
        }
    }
}
