//! Granary - Granule Discovery Pipeline
//!
//! Granary walks a remote provider (HTTP directory listings, SFTP, or S3),
//! finds data files that are new or changed since the last run, and emits
//! normalized records for a downstream ingestion workflow.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │     │  Discovery  │     │  Reconcile  │     │   Output    │
//! │ (HTTP/SFTP/ │────▶│ (tree walk, │────▶│ (diff vs.   │────▶│ (routing +  │
//! │     S3)     │     │  filters)   │     │  SQLite)    │     │  records)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Granule**: one discoverable data file plus its provider metadata
//! - **Duplicate handling**: what happens when a discovered key already has a
//!   stored record (`skip`, `replace`, `error`)
//! - **Route table**: filename patterns mapping files to storage buckets and
//!   backup-verification policy

pub mod config;
pub mod discover;
pub mod error;
pub mod output;
pub mod reconcile;
pub mod run;

// Re-exports for convenience
pub use config::{
    CollectionConfig, DiscoverOptions, DiscoveryConfig, FileRule, Protocol, ProviderConfig,
};
pub use discover::Discoverer;
pub use error::{GranaryError, Result};
pub use output::{generate_records, FileRecord, OutputRecord, RouteTable};
pub use reconcile::{effective_policy, DuplicateHandling, Reconciler};
pub use run::{finish_discovery, run_discovery, run_reingest, run_retraction};
