//! Change detection against the metadata store

use crate::error::Result;
use granary_store::{GranuleMap, GranuleStore};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Policy governing a discovered key that already has a stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    #[default]
    Skip,
    Replace,
    Error,
}

impl DuplicateHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "replace" => Some(Self::Replace),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Resolve the policy actually applied for a run. `replace` is forced back
/// to `skip` unless the force flag is set; repeatedly re-ingesting unchanged
/// granules proved too easy to trigger by accident.
pub fn effective_policy(configured: DuplicateHandling, force_replace: bool) -> DuplicateHandling {
    if configured == DuplicateHandling::Replace && !force_replace {
        info!("Duplicate handling downgraded from replace to skip (forceReplace not set)");
        DuplicateHandling::Skip
    } else {
        configured
    }
}

/// Applies a duplicate-handling policy to one discovery result.
pub struct Reconciler<'a> {
    store: &'a GranuleStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a GranuleStore) -> Self {
        Self { store }
    }

    /// Compare `discovered` against the store under `policy` and return the
    /// surviving subset. The store is updated as a side effect; under the
    /// `error` policy a pre-existing key fails the call and leaves the store
    /// unchanged.
    pub async fn reconcile(
        &self,
        discovered: GranuleMap,
        policy: DuplicateHandling,
    ) -> Result<GranuleMap> {
        let surviving = match policy {
            DuplicateHandling::Skip => self.store.insert_new(&discovered).await?,
            DuplicateHandling::Replace => {
                self.store.replace_all(&discovered).await?;
                discovered
            }
            DuplicateHandling::Error => {
                self.store.insert_strict(&discovered).await?;
                discovered
            }
        };

        info!(
            remaining = surviving.len(),
            policy = policy.as_str(),
            "Granules remaining after update processing"
        );
        Ok(surviving)
    }

    /// Remove stored records for keys a downstream stage rejected.
    pub async fn retract(&self, keys: &[String]) -> Result<u64> {
        Ok(self.store.delete_by_keys(keys).await?)
    }
}
