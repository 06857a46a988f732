//! Providers: fetch payloads for a batch of commit keys.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use modstore_core::check_cancelled;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::DataStore;
use crate::data::{CommitData, CommitKey};
use crate::error::{RegistryError, RegistryResult};

/// Source of payloads, e.g. a remote registry client.
#[async_trait]
pub trait DataProvider<D: CommitData>: Send + Sync {
    /// One payload per key, in key order.
    async fn get_for_keys(
        &self,
        cancel: &CancellationToken,
        keys: &[CommitKey],
    ) -> RegistryResult<Vec<D>>;
}

/// Store first, then the delegate for misses; delegate results are stored.
///
/// Delegate results are verified when stored, so tampered downloads fail
/// the call instead of landing in the cache.
pub struct CachingProvider<D: CommitData> {
    store: Arc<dyn DataStore<D>>,
    delegate: Arc<dyn DataProvider<D>>,
}

impl<D: CommitData> CachingProvider<D> {
    pub fn new(store: Arc<dyn DataStore<D>>, delegate: Arc<dyn DataProvider<D>>) -> Self {
        Self { store, delegate }
    }
}

impl<D: CommitData> fmt::Debug for CachingProvider<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl<D: CommitData> DataProvider<D> for CachingProvider<D> {
    async fn get_for_keys(
        &self,
        cancel: &CancellationToken,
        keys: &[CommitKey],
    ) -> RegistryResult<Vec<D>> {
        check_cancelled(cancel)?;

        let mut seen = BTreeSet::new();
        let unique: Vec<CommitKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();

        let (found, missing) = self.store.get(cancel, &unique).await?;
        debug!(
            requested = keys.len(),
            hits = found.len(),
            misses = missing.len(),
            "checked cache"
        );

        let mut by_key: HashMap<CommitKey, D> = found
            .into_iter()
            .map(|data| (data.commit_key().clone(), data))
            .collect();

        if !missing.is_empty() {
            let fetched = self.delegate.get_for_keys(cancel, &missing).await?;
            self.store.put(cancel, &fetched).await?;
            debug!(fetched = fetched.len(), "stored delegate results");
            by_key.extend(
                fetched
                    .into_iter()
                    .map(|data| (data.commit_key().clone(), data)),
            );
        }

        keys.iter()
            .map(|key| {
                by_key
                    .get(key)
                    .cloned()
                    .ok_or_else(|| RegistryError::NotFound {
                        name: key.full_name.to_string(),
                        commit: key.commit_id.to_string(),
                    })
            })
            .collect()
    }
}
