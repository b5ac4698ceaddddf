//! End-to-end pipeline orchestration
//!
//! Three entry points mirror the three jobs the pipeline is asked to do:
//! discover new granules, retract a batch a downstream stage rejected, and
//! regenerate records for known keys.

use crate::config::DiscoveryConfig;
use crate::discover::Discoverer;
use crate::error::Result;
use crate::output::{generate_records, OutputRecord, RouteTable};
use crate::reconcile::{effective_policy, Reconciler};
use granary_store::{GranuleMap, GranuleMeta, GranuleStore};
use tracing::{info, warn};

/// Run one discovery pass end to end: build the adapter, walk the provider,
/// reconcile against the store, and generate output records.
pub async fn run_discovery(
    config: &DiscoveryConfig,
    store: &GranuleStore,
) -> Result<Vec<OutputRecord>> {
    let discovery = &config.collection.discovery;
    let discoverer = Discoverer::new(
        config.collection.granule_id_extraction.as_deref(),
        discovery.dir_regex.as_deref(),
        discovery.depth,
    )?;

    let adapter = config.build_adapter().await?;
    let root = config.discovery_root();
    info!(
        collection = %config.collection.name,
        protocol = adapter.protocol(),
        root = %root,
        "Starting discovery"
    );

    let discovered = discoverer.discover(&adapter, &root).await?;
    finish_discovery(config, store, discovered).await
}

/// Reconciliation and record generation behind [`run_discovery`], separated
/// from the network-facing walk.
pub async fn finish_discovery(
    config: &DiscoveryConfig,
    store: &GranuleStore,
    discovered: GranuleMap,
) -> Result<Vec<OutputRecord>> {
    if discovered.is_empty() {
        warn!(
            collection = %config.collection.name,
            "Found 0 granules at the provided location"
        );
    } else {
        info!(
            discovered = discovered.len(),
            collection = %config.collection.name,
            "Discovered granules for update processing"
        );
    }

    let policy = effective_policy(
        config.collection.duplicate_handling,
        config.collection.discovery.force_replace,
    );
    let surviving = Reconciler::new(store).reconcile(discovered, policy).await?;

    let routes = RouteTable::compile(&config.collection.files)?;
    let records = generate_records(
        &surviving,
        &routes,
        &config.collection,
        &config.stack,
        &config.root_prefix(),
    );
    info!(records = records.len(), "Generated output records");

    if config.suppress_output {
        warn!("Output suppressed by configuration; returning no records");
        return Ok(Vec::new());
    }
    Ok(records)
}

/// Remove store records for a batch a downstream stage rejected. Keys are
/// rebuilt from each record's emitted path and name.
pub async fn run_retraction(
    config: &DiscoveryConfig,
    store: &GranuleStore,
    records: &[OutputRecord],
) -> Result<u64> {
    let root_prefix = config.root_prefix();
    let keys: Vec<String> = records
        .iter()
        .flat_map(|record| record.files.iter())
        .map(|file| rebuild_key(&root_prefix, &file.path, &file.name))
        .collect();

    let removed = Reconciler::new(store).retract(&keys).await?;
    info!(
        removed,
        requested = keys.len(),
        "Cleaned records from the store"
    );
    Ok(removed)
}

/// Regenerate output records for already-known keys without discovery or
/// store access. Metadata fields are left absent.
pub fn run_reingest(config: &DiscoveryConfig, keys: &[String]) -> Result<Vec<OutputRecord>> {
    info!(count = keys.len(), "Received granules to re-ingest");
    let mut granules = GranuleMap::new();
    for key in keys {
        granules.insert(key.clone(), GranuleMeta::default());
    }

    let routes = RouteTable::compile(&config.collection.files)?;
    Ok(generate_records(
        &granules,
        &routes,
        &config.collection,
        &config.stack,
        &config.root_prefix(),
    ))
}

/// Emitted paths had the provider root prefix stripped; restore it for
/// relative paths so the rebuilt key matches what discovery stored.
fn rebuild_key(root_prefix: &str, path: &str, name: &str) -> String {
    if path.is_empty() {
        format!("/{name}")
    } else if path.starts_with('/') || path.contains("://") {
        format!("{path}/{name}")
    } else {
        format!("{root_prefix}{path}/{name}")
    }
}
