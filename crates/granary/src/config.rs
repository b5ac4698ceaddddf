//! Configuration for a discovery pipeline run

use crate::discover::compile_pattern;
use crate::error::{GranaryError, Result};
use crate::reconcile::DuplicateHandling;
use granary_transport::{
    Adapter, HttpConfig, HttpTransport, S3Options, S3Transport, SftpConfig, SftpTransport,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Transfer protocol used to reach the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Sftp,
    S3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Sftp => "sftp",
            Protocol::S3 => "s3",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub protocol: Protocol,

    /// Hostname for HTTP/SFTP providers, bucket name for S3
    pub host: String,

    /// Root path (HTTP/SFTP) or key prefix (S3)
    #[serde(default)]
    pub path: String,

    /// SFTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resolved credentials; secret retrieval happens upstream
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Skip TLS certificate verification for HTTPS listings
    #[serde(default)]
    pub allow_invalid_certs: bool,

    /// S3 client settings, ignored for other protocols
    #[serde(default)]
    pub s3: S3Options,
}

/// One filename-routing rule; rules are evaluated in order, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRule {
    /// Pattern matched against the file's base name
    pub regex: String,

    /// Bucket suffix, joined to the stack name in output records
    pub bucket: String,

    /// Request backup verification; copies the identity tag into the checksum
    #[serde(default)]
    pub backup: bool,
}

/// Traversal options for one collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverOptions {
    /// Directory recursion depth, clamped to [0, 3]
    #[serde(default)]
    pub depth: i32,

    /// Pattern a directory's full path must match to be entered
    #[serde(default)]
    pub dir_regex: Option<String>,

    /// Allow `replace` duplicate handling to take effect
    #[serde(default)]
    pub force_replace: bool,
}

/// Collection identity plus its discovery and routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Pattern a file's base name must match to be discovered
    #[serde(default)]
    pub granule_id_extraction: Option<String>,

    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,

    /// Store filename suffix; collections sharing a suffix share a store
    #[serde(default = "default_collection_type")]
    pub collection_type: String,

    #[serde(default)]
    pub files: Vec<FileRule>,

    #[serde(default)]
    pub discovery: DiscoverOptions,
}

/// Top-level configuration for one discovery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Deployment namespace, prefixed onto every routed bucket
    pub stack: String,

    /// Run the pipeline but return no output records
    #[serde(default)]
    pub suppress_output: bool,

    /// Store location; defaults under the Granary home directory
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Concurrent HTTP metadata probes
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    pub provider: ProviderConfig,

    pub collection: CollectionConfig,
}

fn default_port() -> u16 {
    22
}

fn default_fan_out() -> usize {
    8
}

fn default_collection_type() -> String {
    "static".to_string()
}

impl DiscoveryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DiscoveryConfig =
            toml::from_str(&content).map_err(|e| GranaryError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| GranaryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate before any traversal begins. Compiles every configured
    /// pattern so a bad regex fails here rather than mid-walk.
    pub fn validate(&self) -> Result<()> {
        if self.stack.is_empty() {
            return Err(GranaryError::Config("stack must not be empty".to_string()));
        }
        if self.provider.host.is_empty() {
            return Err(GranaryError::Config(
                "provider.host must not be empty".to_string(),
            ));
        }
        if let Some(pattern) = &self.collection.granule_id_extraction {
            compile_pattern(pattern)?;
        }
        if let Some(pattern) = &self.collection.discovery.dir_regex {
            compile_pattern(pattern)?;
        }
        for rule in &self.collection.files {
            compile_pattern(&rule.regex)?;
        }
        Ok(())
    }

    /// Full URL of the provider root: `{protocol}://{host}/{path}`.
    pub fn provider_url(&self) -> String {
        format!(
            "{}://{}/{}",
            self.provider.protocol,
            self.provider.host.trim_end_matches('/'),
            self.provider.path.trim_start_matches('/')
        )
    }

    /// Prefix stripped from keys when computing output record paths.
    pub fn root_prefix(&self) -> String {
        format!("{}://{}/", self.provider.protocol, self.provider.host)
    }

    /// Root location handed to the discovery engine: a full URL for HTTP, a
    /// remote path for SFTP, a key prefix for S3.
    pub fn discovery_root(&self) -> String {
        match self.provider.protocol {
            Protocol::Http | Protocol::Https => self.provider_url(),
            Protocol::Sftp | Protocol::S3 => self.provider.path.clone(),
        }
    }

    /// Store location for this collection:
    /// `~/.granary/granules_{collectionType}.sqlite3` unless overridden.
    pub fn resolve_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            granary_logging::granary_home().join(format!(
                "granules_{}.sqlite3",
                self.collection.collection_type
            ))
        })
    }

    /// Build the transport adapter once per run from provider settings.
    pub async fn build_adapter(&self) -> Result<Adapter> {
        let provider = &self.provider;
        match provider.protocol {
            Protocol::Http | Protocol::Https => {
                let http = HttpTransport::new(&HttpConfig {
                    fan_out: self.fan_out,
                    allow_invalid_certs: provider.allow_invalid_certs,
                    ..HttpConfig::default()
                })?;
                Ok(Adapter::Http(http))
            }
            Protocol::Sftp => {
                let sftp = SftpTransport::connect(&SftpConfig {
                    host: provider.host.clone(),
                    port: provider.port,
                    username: provider.username.clone().unwrap_or_default(),
                    password: provider.password.clone(),
                })?;
                Ok(Adapter::Sftp(sftp))
            }
            Protocol::S3 => Ok(Adapter::S3(
                S3Transport::connect(&provider.s3, provider.host.clone()).await,
            )),
        }
    }
}
