//! S3 adapter.
//!
//! S3 has no directory tree to walk: one paginated `list_objects_v2` pass
//! over a key prefix reports every object. Keys are rendered as
//! `s3://{bucket}/{key}` so the rest of the pipeline sees one key shape per
//! provider.

use crate::error::{Result, TransportError};
use crate::RawEntry;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PAGE_SIZE: i32 = 1000;

/// S3 access configuration. All fields are optional; absent values fall
/// back to the ambient AWS environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Options {
    /// AWS region
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (for LocalStack-style deployments)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Explicit AWS access key
    #[serde(default)]
    pub access_key: Option<String>,

    /// Explicit AWS secret key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// AWS profile name
    #[serde(default)]
    pub profile: Option<String>,
}

/// Create an S3 client from configuration.
pub async fn create_client(options: &S3Options) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &options.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &options.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&options.access_key, &options.secret_key) {
        let credentials =
            aws_sdk_s3::config::Credentials::new(access_key, secret_key, None, None, "granary");
        loader = loader.credentials_provider(credentials);
    }

    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }

    let shared = loader.load().await;
    let builder = aws_sdk_s3::config::Builder::from(&shared);

    // Path-style access for custom endpoints
    let config = if options.endpoint.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };

    Client::from_conf(config)
}

/// Flat-listing S3 transport for one bucket.
pub struct S3Transport {
    client: Client,
    bucket: String,
}

impl S3Transport {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build the client from options and wrap it.
    pub async fn connect(options: &S3Options, bucket: impl Into<String>) -> Self {
        Self::new(create_client(options).await, bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List every object under `prefix`, following continuation tokens until
    /// the listing is exhausted. Zero-byte directory markers are skipped.
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<RawEntry>> {
        let mut continuation: Option<String> = None;
        let mut entries = Vec::new();
        let mut pages = 0u32;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys(PAGE_SIZE);

            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| TransportError::S3 {
                location: s3_location(&self.bucket, prefix),
                message: DisplayErrorContext(&e).to_string(),
            })?;

            for object in response.contents() {
                if let Some(entry) = object_to_entry(&self.bucket, object) {
                    entries.push(entry);
                }
            }
            pages += 1;

            if response.is_truncated() == Some(true) {
                continuation = response.next_continuation_token().map(str::to_string);
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            objects = entries.len(),
            pages,
            "Listed S3 prefix"
        );

        Ok(entries)
    }
}

fn object_to_entry(bucket: &str, object: &Object) -> Option<RawEntry> {
    let key = object.key().filter(|k| !k.is_empty() && !k.ends_with('/'))?;
    let name = key.rsplit('/').next().unwrap_or(key).to_string();

    Some(RawEntry {
        name,
        key: s3_location(bucket, key),
        etag: object.e_tag().map(strip_etag_quotes),
        last_modified: object.last_modified().map(|t| t.secs()),
        size: object.size(),
        is_dir: false,
    })
}

fn s3_location(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

/// S3 ETags arrive wrapped in literal quotes; stored tags carry none.
fn strip_etag_quotes(value: &str) -> String {
    value.trim_matches('"').to_string()
}
