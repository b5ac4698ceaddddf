//! HTTP(S) directory-listing adapter.
//!
//! Walks server-generated index pages: fetches the listing, extracts child
//! hyperlinks, then probes each child with a HEAD request for its markers.
//! An entry whose probe returns neither an ETag nor a Last-Modified header
//! is reported as a directory candidate.

use crate::error::{Result, TransportError};
use crate::{RawEntry, Transport};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// HTTP adapter configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Concurrent HEAD probes per listing page.
    pub fan_out: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Skip TLS certificate verification (self-signed providers).
    pub allow_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            fan_out: 8,
            timeout_secs: 30,
            allow_invalid_certs: false,
        }
    }
}

/// Directory-listing HTTP(S) transport.
pub struct HttpTransport {
    client: reqwest::Client,
    link_selector: Selector,
    fan_out: usize,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.allow_invalid_certs)
            .build()
            .map_err(TransportError::ClientBuild)?;

        let link_selector = Selector::parse("a[href]")
            .map_err(|e| TransportError::Selector(e.to_string()))?;

        Ok(Self {
            client,
            link_selector,
            fan_out: config.fan_out.max(1),
        })
    }

    /// HEAD the child and read its markers off the response headers.
    async fn probe(&self, name: String, url: String) -> Result<RawEntry> {
        let response =
            self.client
                .head(&url)
                .send()
                .await
                .map_err(|source| TransportError::Http {
                    url: url.clone(),
                    source,
                })?;

        let headers = response.headers();
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let last_modified = headers
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let size = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        // No file markers at all means the link points at another listing.
        let is_dir = etag.is_none() && last_modified.is_none();

        Ok(RawEntry {
            name,
            key: url,
            etag,
            last_modified,
            size,
            is_dir,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_children(&self, location: &str) -> Result<Vec<RawEntry>> {
        let page = self
            .client
            .get(location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| TransportError::Http {
                url: location.to_string(),
                source,
            })?
            .text()
            .await
            .map_err(|source| TransportError::Http {
                url: location.to_string(),
                source,
            })?;

        let segments = child_segments(&page, &self.link_selector);
        debug!(url = %location, children = segments.len(), "Parsed listing page");

        let base = location.trim_end_matches('/');
        let probes = segments
            .into_iter()
            .map(|segment| self.probe(segment.clone(), format!("{base}/{segment}")));

        stream::iter(probes)
            .buffer_unordered(self.fan_out)
            .try_collect()
            .await
    }
}

/// Extract child-entry names from a listing page.
///
/// Only relative links that stay below the listing are considered: query,
/// fragment, absolute, and parent links are server chrome, not children.
/// The name is the last path segment of the href.
fn child_segments(page: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(page);
    let mut seen = BTreeSet::new();

    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !is_child_href(href) {
            continue;
        }
        let segment = href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if !segment.is_empty() {
            seen.insert(segment.to_string());
        }
    }

    seen.into_iter().collect()
}

fn is_child_href(href: &str) -> bool {
    if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
        return false;
    }
    if href.starts_with('/') || href.contains("://") {
        return false;
    }
    href != "." && href != ".." && !href.starts_with("../")
}

/// HTTP dates arrive as RFC 2822; some servers emit RFC 3339. Anything else
/// is treated as an absent header, never an error.
fn parse_http_date(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.timestamp())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
        <html><body>
        <h1>Index of /granules</h1>
        <a href="?C=N;O=D">Name</a>
        <a href="#top">Top</a>
        <a href="/granules/">Root</a>
        <a href="../">Parent Directory</a>
        <a href="data_2021.nc">data_2021.nc</a>
        <a href="data_2022.nc">data_2022.nc</a>
        <a href="archive/">archive/</a>
        <a href="nested/deep.nc">deep.nc</a>
        <a href="https://example.com/elsewhere">mirror</a>
        </body></html>
    "##;

    #[test]
    fn test_child_segments_skips_server_chrome() {
        let selector = Selector::parse("a[href]").unwrap();
        let segments = child_segments(LISTING, &selector);
        assert_eq!(
            segments,
            vec!["archive", "data_2021.nc", "data_2022.nc", "deep.nc"]
        );
    }

    #[test]
    fn test_child_segments_dedups_repeated_links() {
        let selector = Selector::parse("a[href]").unwrap();
        let page = r#"<a href="a.nc">a</a><a href="a.nc/">a again</a>"#;
        assert_eq!(child_segments(page, &selector), vec!["a.nc"]);
    }

    #[test]
    fn test_is_child_href() {
        assert!(is_child_href("file.nc"));
        assert!(is_child_href("subdir/"));
        assert!(!is_child_href(""));
        assert!(!is_child_href("?C=M;O=A"));
        assert!(!is_child_href("#section"));
        assert!(!is_child_href("/absolute/path"));
        assert!(!is_child_href(".."));
        assert!(!is_child_href("../up"));
        assert!(!is_child_href("http://example.com/away"));
    }

    #[test]
    fn test_parse_http_date_rfc2822() {
        assert_eq!(
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(1445412480)
        );
    }

    #[test]
    fn test_parse_http_date_rfc3339_fallback() {
        assert_eq!(parse_http_date("2015-10-21T07:28:00Z"), Some(1445412480));
    }

    #[test]
    fn test_parse_http_date_malformed_is_none() {
        assert_eq!(parse_http_date("yesterday-ish"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn test_transport_builds_with_defaults() {
        assert!(HttpTransport::new(&HttpConfig::default()).is_ok());
    }
}
