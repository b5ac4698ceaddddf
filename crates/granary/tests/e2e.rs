//! End-to-end tests for the discovery pipeline
//!
//! These drive the full chain (walk -> reconcile -> output records) against
//! an in-memory transport fixture and a temp-directory SQLite store, the way
//! the CLI wires it, minus the network.

use async_trait::async_trait;
use granary::{
    finish_discovery, run_reingest, run_retraction, CollectionConfig, DiscoverOptions,
    Discoverer, DiscoveryConfig, DuplicateHandling, FileRule, GranaryError, Protocol,
    ProviderConfig,
};
use granary_store::{GranuleStore, StoreError};
use granary_transport::{RawEntry, Transport};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

const ROOT: &str = "https://archive.example.com/obs";

/// Create a test environment with a temp-directory store
struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    /// Store path inside the temp directory
    pub store_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store_path = temp.path().join("granules_static.sqlite3");
        Self {
            _temp: temp,
            store_path,
        }
    }

    async fn open_store(&self) -> GranuleStore {
        GranuleStore::open(&self.store_path)
            .await
            .expect("Failed to open store")
    }
}

/// Transport fixture serving canned directory listings
struct MockTransport {
    listings: HashMap<String, Vec<RawEntry>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            listings: HashMap::new(),
        }
    }

    fn listing(mut self, location: &str, entries: Vec<RawEntry>) -> Self {
        self.listings.insert(location.to_string(), entries);
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list_children(&self, location: &str) -> granary_transport::Result<Vec<RawEntry>> {
        Ok(self.listings.get(location).cloned().unwrap_or_default())
    }
}

fn file(name: &str, etag: &str, time: i64) -> RawEntry {
    RawEntry {
        name: name.to_string(),
        key: format!("{ROOT}/{name}"),
        etag: Some(etag.to_string()),
        last_modified: Some(time),
        size: Some(1024),
        is_dir: false,
    }
}

fn file_at(parent: &str, name: &str, etag: &str) -> RawEntry {
    RawEntry {
        name: name.to_string(),
        key: format!("{parent}/{name}"),
        etag: Some(etag.to_string()),
        last_modified: Some(1_000),
        size: Some(1024),
        is_dir: false,
    }
}

fn dir(name: &str) -> RawEntry {
    RawEntry {
        name: name.to_string(),
        key: format!("{ROOT}/{name}"),
        etag: None,
        last_modified: None,
        size: None,
        is_dir: true,
    }
}

fn test_config(files: Vec<FileRule>) -> DiscoveryConfig {
    DiscoveryConfig {
        stack: "sbx".to_string(),
        suppress_output: false,
        store_path: None,
        fan_out: 8,
        provider: ProviderConfig {
            protocol: Protocol::Https,
            host: "archive.example.com".to_string(),
            path: "obs".to_string(),
            port: 22,
            username: None,
            password: None,
            allow_invalid_certs: false,
            s3: Default::default(),
        },
        collection: CollectionConfig {
            name: "OBS".to_string(),
            version: "2".to_string(),
            granule_id_extraction: Some(r"\.nc$".to_string()),
            duplicate_handling: DuplicateHandling::Skip,
            collection_type: "static".to_string(),
            files,
            discovery: DiscoverOptions {
                depth: 1,
                dir_regex: None,
                force_replace: false,
            },
        },
    }
}

fn nc_rules() -> Vec<FileRule> {
    vec![FileRule {
        regex: r"\.nc$".to_string(),
        bucket: "protected".to_string(),
        backup: true,
    }]
}

fn discoverer_for(config: &DiscoveryConfig) -> Discoverer {
    Discoverer::new(
        config.collection.granule_id_extraction.as_deref(),
        config.collection.discovery.dir_regex.as_deref(),
        config.collection.discovery.depth,
    )
    .expect("Failed to build discoverer")
}

// ============================================================================
// Discovery Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_discovery_pipeline_end_to_end() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let config = test_config(nc_rules());

    let transport = MockTransport::new()
        .listing(
            ROOT,
            vec![
                file("20230101.nc", "e1", 100),
                file("readme.txt", "e9", 100),
                dir("daily"),
            ],
        )
        .listing(
            &format!("{ROOT}/daily"),
            vec![file_at(&format!("{ROOT}/daily"), "20230102.nc", "e2")],
        );

    // Walk, reconcile, and generate records
    let discovered = discoverer_for(&config)
        .discover_tree(&transport, ROOT)
        .await
        .unwrap();
    let records = finish_discovery(&config, &store, discovered).await.unwrap();

    // readme.txt fails the file pattern and is dropped
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].granule_id, "20230101.nc");
    assert_eq!(records[0].data_type, "OBS");
    assert_eq!(records[0].version, "2");
    assert_eq!(records[0].files[0].bucket, "sbx-protected");
    assert_eq!(records[0].files[0].checksum, "e1");
    assert_eq!(records[0].files[0].checksum_type, "md5");
    assert_eq!(records[0].files[0].path, "obs");
    assert_eq!(records[1].granule_id, "20230102.nc");
    assert_eq!(records[1].files[0].path, "obs/daily");

    // Both survivors are persisted
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_second_run_discovers_nothing_new() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let config = test_config(nc_rules());

    let transport =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1", 100)]);

    let discoverer = discoverer_for(&config);
    let first = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    let records = finish_discovery(&config, &store, first).await.unwrap();
    assert_eq!(records.len(), 1);

    // Same listing again: skip policy drops the known key
    let second = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    let records = finish_discovery(&config, &store, second).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_replace_without_force_behaves_like_skip() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let mut config = test_config(nc_rules());
    config.collection.duplicate_handling = DuplicateHandling::Replace;

    let transport =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1", 100)]);
    let discoverer = discoverer_for(&config);

    let first = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    finish_discovery(&config, &store, first).await.unwrap();

    // Changed upstream, but replace is downgraded without the force flag
    let changed =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1-new", 200)]);
    let second = discoverer.discover_tree(&changed, ROOT).await.unwrap();
    let records = finish_discovery(&config, &store, second).await.unwrap();
    assert!(records.is_empty());

    let stored = store.get(&format!("{ROOT}/20230101.nc")).await.unwrap().unwrap();
    assert_eq!(stored.meta.etag.as_deref(), Some("e1"));
}

#[tokio::test]
async fn test_force_replace_reingests_changed_granules() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let mut config = test_config(nc_rules());
    config.collection.duplicate_handling = DuplicateHandling::Replace;
    config.collection.discovery.force_replace = true;

    let transport =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1", 100)]);
    let discoverer = discoverer_for(&config);

    let first = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    finish_discovery(&config, &store, first).await.unwrap();

    let changed =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1-new", 200)]);
    let second = discoverer.discover_tree(&changed, ROOT).await.unwrap();
    let records = finish_discovery(&config, &store, second).await.unwrap();

    // Every discovered key survives and the store holds the newest markers
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].files[0].checksum, "e1-new");

    let stored = store.get(&format!("{ROOT}/20230101.nc")).await.unwrap().unwrap();
    assert_eq!(stored.meta.etag.as_deref(), Some("e1-new"));
    assert_eq!(stored.meta.last_modified, Some(200));
}

#[tokio::test]
async fn test_error_policy_rejects_duplicates_and_keeps_store() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let mut config = test_config(nc_rules());

    let transport =
        MockTransport::new().listing(ROOT, vec![file("20230101.nc", "e1", 100)]);
    let discoverer = discoverer_for(&config);

    let first = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    finish_discovery(&config, &store, first).await.unwrap();
    let before = store.list_all().await.unwrap();

    config.collection.duplicate_handling = DuplicateHandling::Error;
    let second = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    let err = finish_discovery(&config, &store, second).await.unwrap_err();
    assert!(matches!(
        err,
        GranaryError::Store(StoreError::DuplicateKey(_))
    ));

    assert_eq!(store.list_all().await.unwrap(), before);
}

// ============================================================================
// Retraction & Reingest Tests
// ============================================================================

#[tokio::test]
async fn test_retract_then_rediscover() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let config = test_config(nc_rules());

    let transport = MockTransport::new().listing(
        ROOT,
        vec![file("20230101.nc", "e1", 100), file("20230102.nc", "e2", 100)],
    );
    let discoverer = discoverer_for(&config);

    let discovered = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    let records = finish_discovery(&config, &store, discovered.clone())
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    // Downstream rejected the batch: retract it using the emitted records
    let removed = run_retraction(&config, &store, &records).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.count().await.unwrap(), 0);

    // The next run rediscovers the same granules
    let records = finish_discovery(&config, &store, discovered).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_reingest_emits_without_touching_store() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let config = test_config(nc_rules());

    let keys = vec![format!("{ROOT}/20230101.nc")];
    let records = run_reingest(&config, &keys).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].granule_id, "20230101.nc");
    assert_eq!(records[0].files[0].bucket, "sbx-protected");
    assert!(records[0].files[0].time.is_none());
    assert_eq!(store.count().await.unwrap(), 0);
}

// ============================================================================
// Filtering & Routing Tests
// ============================================================================

#[tokio::test]
async fn test_unrouted_files_are_still_emitted() {
    let env = TestEnv::new();
    let store = env.open_store().await;
    let mut config = test_config(nc_rules());
    // No file pattern: the .txt is discovered, it just matches no route
    config.collection.granule_id_extraction = None;

    let transport = MockTransport::new().listing(
        ROOT,
        vec![file("20230101.nc", "e1", 100), file("notes.txt", "e2", 100)],
    );

    let discovered = discoverer_for(&config)
        .discover_tree(&transport, ROOT)
        .await
        .unwrap();
    let records = finish_discovery(&config, &store, discovered).await.unwrap();
    assert_eq!(records.len(), 2);

    let nc = records.iter().find(|r| r.granule_id == "20230101.nc").unwrap();
    assert_eq!(nc.files[0].bucket, "sbx-protected");

    let txt = records.iter().find(|r| r.granule_id == "notes.txt").unwrap();
    assert_eq!(txt.files[0].bucket, "");
    assert_eq!(txt.files[0].checksum, "");
    assert_eq!(txt.files[0].checksum_type, "");
}

#[tokio::test]
async fn test_depth_budget_from_config_is_clamped() {
    let mut config = test_config(nc_rules());
    config.collection.discovery.depth = -9;

    let discoverer = discoverer_for(&config);
    assert_eq!(discoverer.depth(), 3);

    // Five nested levels; the walk must stop after three recursions
    let mut transport = MockTransport::new().listing(
        ROOT,
        vec![file("f0.nc", "e", 1), dir("d1")],
    );
    let mut parent = format!("{ROOT}/d1");
    for level in 1..=4 {
        let child = format!("{parent}/d{}", level + 1);
        transport = transport.listing(
            &parent,
            vec![
                file_at(&parent, &format!("f{level}.nc"), "e"),
                RawEntry {
                    name: format!("d{}", level + 1),
                    key: child.clone(),
                    etag: None,
                    last_modified: None,
                    size: None,
                    is_dir: true,
                },
            ],
        );
        parent = child;
    }

    let discovered = discoverer.discover_tree(&transport, ROOT).await.unwrap();
    let names: Vec<String> = discovered
        .keys()
        .map(|k| k.rsplit('/').next().unwrap().to_string())
        .collect();
    // BTreeMap order puts the deepest directory branch first
    assert_eq!(names, vec!["f3.nc", "f2.nc", "f1.nc", "f0.nc"]);
}
