//! Recursive discovery engine
//!
//! Walks a provider's directory tree through a transport adapter, classifies
//! each child as file or directory from the markers the provider reports, and
//! accumulates the files that pass the configured filters. Ambiguous entries
//! are dropped with a notice, never guessed at.

use crate::error::{GranaryError, Result};
use granary_store::{GranuleMap, GranuleMeta};
use granary_transport::{Adapter, RawEntry, S3Transport, Transport};
use regex::Regex;
use tracing::{debug, warn};

/// Hard ceiling on recursion depth, applied after taking the absolute value
/// of the configured depth.
pub const MAX_DEPTH: u32 = 3;

/// Compile one configured pattern, carrying the pattern text in the error.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| GranaryError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_filter(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern.map(compile_pattern).transpose()
}

fn clamp_depth(depth: i32) -> u32 {
    depth.unsigned_abs().min(MAX_DEPTH)
}

fn into_meta(entry: RawEntry) -> (String, GranuleMeta) {
    let RawEntry {
        key,
        etag,
        last_modified,
        size,
        ..
    } = entry;
    (
        key,
        GranuleMeta {
            etag,
            last_modified,
            size,
        },
    )
}

/// Tree walker with compiled filters and a bounded depth budget.
///
/// Patterns are compiled at construction so a bad regex fails before any
/// traversal begins. Both filters are unanchored searches: the file pattern
/// runs against base names, the directory pattern against full paths.
#[derive(Debug)]
pub struct Discoverer {
    file_regex: Option<Regex>,
    dir_regex: Option<Regex>,
    depth: u32,
}

impl Discoverer {
    pub fn new(file_regex: Option<&str>, dir_regex: Option<&str>, depth: i32) -> Result<Self> {
        Ok(Self {
            file_regex: compile_filter(file_regex)?,
            dir_regex: compile_filter(dir_regex)?,
            depth: clamp_depth(depth),
        })
    }

    /// Effective recursion depth after clamping.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Run the traversal matching the adapter variant: tree walk for HTTP
    /// and SFTP, flat prefix listing for S3.
    pub async fn discover(&self, adapter: &Adapter, root: &str) -> Result<GranuleMap> {
        match adapter {
            Adapter::Http(http) => self.discover_tree(http, root).await,
            Adapter::Sftp(sftp) => self.discover_tree(sftp, root).await,
            Adapter::S3(s3) => self.discover_flat(s3, root).await,
        }
    }

    /// Walk the directory tree under `root`.
    ///
    /// A child with at least one file marker is a file, kept iff the file
    /// pattern matches its base name. A directory is entered iff the dir
    /// pattern matches its full path and depth budget remains. Everything
    /// else is logged unprocessed and dropped. Keys encode full locations,
    /// so branch merges cannot collide.
    pub async fn discover_tree(
        &self,
        transport: &dyn Transport,
        root: &str,
    ) -> Result<GranuleMap> {
        let mut granules = GranuleMap::new();
        let mut worklist = vec![(root.to_string(), self.depth)];

        while let Some((location, remaining)) = worklist.pop() {
            let children = transport.list_children(&location).await?;
            debug!(location = %location, children = children.len(), "Listed location");

            for entry in children {
                if entry.is_dir {
                    if !self.dir_matches(&entry.key) {
                        warn!(path = %entry.key, "Directory not processed");
                    } else if remaining > 0 {
                        worklist.push((entry.key, remaining - 1));
                    } else {
                        debug!(path = %entry.key, "Recursion depth exhausted");
                    }
                } else if entry.has_markers() {
                    if self.file_matches(&entry.name) {
                        let (key, meta) = into_meta(entry);
                        granules.insert(key, meta);
                    } else {
                        warn!(name = %entry.name, "File not processed");
                    }
                } else {
                    warn!(name = %entry.name, "Entry not processed");
                }
            }
        }

        Ok(granules)
    }

    /// Flat discovery for S3: list the prefix once and filter.
    pub async fn discover_flat(&self, s3: &S3Transport, prefix: &str) -> Result<GranuleMap> {
        let entries = s3.list_prefix(prefix).await?;
        Ok(self.filter_flat(entries))
    }

    /// Filtering behind [`discover_flat`]: every entry is a file, jointly
    /// filtered by the file pattern on its base name and the dir pattern on
    /// its full parent path.
    pub fn filter_flat(&self, entries: Vec<RawEntry>) -> GranuleMap {
        let mut granules = GranuleMap::new();
        for entry in entries {
            let parent = entry.key.rsplit_once('/').map_or("", |(dir, _)| dir);
            if self.file_matches(&entry.name) && self.dir_matches(parent) {
                let (key, meta) = into_meta(entry);
                granules.insert(key, meta);
            }
        }
        granules
    }

    fn file_matches(&self, name: &str) -> bool {
        self.file_regex.as_ref().map_or(true, |re| re.is_match(name))
    }

    fn dir_matches(&self, path: &str) -> bool {
        self.dir_regex.as_ref().map_or(true, |re| re.is_match(path))
    }
}
