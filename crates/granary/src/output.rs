//! Output record generation
//!
//! Maps surviving granules to the normalized record shape the downstream
//! workflow consumes. Field names on the wire are fixed by that consumer
//! (`granuleId`, `checksumType`, `type`), so the serde renames here are part
//! of the contract.

use crate::config::{CollectionConfig, FileRule};
use crate::discover::compile_pattern;
use crate::error::Result;
use granary_store::{GranuleMap, GranuleMeta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Checksum type reported when a rule requests backup verification.
const BACKUP_CHECKSUM_TYPE: &str = "md5";

/// One file entry inside an output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub bucket: String,
    pub checksum: String,
    pub checksum_type: String,
    /// Full key the file was discovered under.
    pub filename: String,
    pub name: String,
    /// Parent path with the provider root prefix stripped.
    pub path: String,
    pub size: Option<i64>,
    pub time: Option<i64>,
    /// Left empty; a downstream classifier assigns it.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Normalized record for one discovered granule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub granule_id: String,
    pub data_type: String,
    pub version: String,
    pub files: Vec<FileRecord>,
}

struct CompiledRule {
    regex: Regex,
    bucket: String,
    backup: bool,
}

/// Filename-routing rules, compiled once at validation time and evaluated
/// in declaration order.
pub struct RouteTable {
    rules: Vec<CompiledRule>,
}

impl RouteTable {
    pub fn compile(rules: &[FileRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push(CompiledRule {
                regex: compile_pattern(&rule.regex)?,
                bucket: rule.bucket.clone(),
                backup: rule.backup,
            });
        }
        Ok(Self { rules: compiled })
    }

    /// First rule whose pattern matches the base name, if any.
    fn route(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.regex.is_match(name))
    }
}

/// Generate one output record per granule, in map iteration order.
pub fn generate_records(
    granules: &GranuleMap,
    routes: &RouteTable,
    collection: &CollectionConfig,
    stack: &str,
    root_prefix: &str,
) -> Vec<OutputRecord> {
    granules
        .iter()
        .map(|(key, meta)| build_record(key, meta, routes, collection, stack, root_prefix))
        .collect()
}

fn build_record(
    key: &str,
    meta: &GranuleMeta,
    routes: &RouteTable,
    collection: &CollectionConfig,
    stack: &str,
    root_prefix: &str,
) -> OutputRecord {
    let (parent, name) = split_key(key);
    let path = parent.strip_prefix(root_prefix).unwrap_or(parent);

    let (bucket, backup) = match routes.route(name) {
        Some(rule) => (format!("{stack}-{}", rule.bucket), rule.backup),
        None => (String::new(), false),
    };

    let (checksum, checksum_type) = if backup {
        info!(key = %key, "Backup verification requested");
        (
            meta.etag.clone().unwrap_or_default(),
            BACKUP_CHECKSUM_TYPE.to_string(),
        )
    } else {
        (String::new(), String::new())
    };

    OutputRecord {
        granule_id: name.to_string(),
        data_type: collection.name.clone(),
        version: collection.version.clone(),
        files: vec![FileRecord {
            bucket,
            checksum,
            checksum_type,
            filename: key.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            size: meta.size,
            time: meta.last_modified,
            kind: String::new(),
        }],
    }
}

/// Split a key on its last separator into (parent, base name).
fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once('/').unwrap_or(("", key))
}
