//! Granule metadata types shared by the store and the discovery engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider-reported markers for a single granule.
///
/// Every field is independently optional: an HTTP listing may expose any
/// subset of the three, SFTP reports a fixed `"N/A"` identity tag, and S3
/// always reports all three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleMeta {
    /// Identity tag (HTTP ETag with quotes, S3 ETag without, or `"N/A"` for SFTP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Modification time, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl GranuleMeta {
    /// True when the provider reported no markers at all.
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none() && self.size.is_none()
    }
}

/// Discovered granules keyed by full provider location.
///
/// A BTreeMap keeps iteration deterministic, so output record order is
/// stable across runs.
pub type GranuleMap = BTreeMap<String, GranuleMeta>;

/// A granule row as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGranule {
    pub key: String,
    pub meta: GranuleMeta,
    /// Milliseconds since epoch, set on first insert.
    pub first_seen_at: i64,
    /// Milliseconds since epoch, refreshed on every write.
    pub last_seen_at: i64,
}
