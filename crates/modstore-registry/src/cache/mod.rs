//! Local cache for module and plugin commits.
//!
//! Reads are verified lazily through the returned payloads; writes verify
//! first, so tampered content is never persisted.
//!
//! # Cache Structure
//!
//! ```text
//! <cache_dir>/
//!   modules/shake256/{registry}/{owner}/{name}/{commit}.manifest
//!   modules/blobs/shake256/{hex[0..2]}/{hex[2..]}
//!   plugins/shake256/{registry}/{owner}/{name}/{commit}.wasm
//! ```
//!
//! There is no eviction. [`DataCache::clear`] empties the cache.

pub mod keys;
mod module;
mod plugin;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use modstore_core::{delete_all, ObjectStoreBucket};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CacheConfig;
use crate::data::{CommitData, CommitKey, ModuleData, PluginData};
use crate::error::RegistryResult;
use crate::provider::{CachingProvider, DataProvider};

pub use module::ModuleDataStore;
pub use plugin::PluginDataStore;

/// Keyed payload storage.
#[async_trait]
pub trait DataStore<D: CommitData>: Send + Sync {
    /// Look up `keys`, returning `(found, not_found)`, each in input order.
    ///
    /// Found payloads are not verified yet. Any I/O error other than a
    /// missing entry aborts the whole batch.
    async fn get(
        &self,
        cancel: &CancellationToken,
        keys: &[CommitKey],
    ) -> RegistryResult<(Vec<D>, Vec<CommitKey>)>;

    /// Verify and write `items`, replacing existing entries.
    async fn put(&self, cancel: &CancellationToken, items: &[D]) -> RegistryResult<()>;
}

/// Module and plugin stores sharing one cache root.
#[derive(Debug, Clone)]
pub struct DataCache {
    root: ObjectStoreBucket,
    modules: Arc<ModuleDataStore>,
    plugins: Arc<PluginDataStore>,
}

impl DataCache {
    /// Cache over `root`.
    pub fn new(root: ObjectStoreBucket) -> RegistryResult<Self> {
        let modules = ModuleDataStore::new(Arc::new(root.sub_bucket("modules")?));
        let plugins = PluginDataStore::new(Arc::new(root.sub_bucket("plugins")?));
        Ok(Self {
            root,
            modules: Arc::new(modules),
            plugins: Arc::new(plugins),
        })
    }

    /// Open the on-disk cache at the configured directory.
    pub fn open(config: &CacheConfig) -> RegistryResult<Self> {
        let root = ObjectStoreBucket::local(&config.cache_dir)?;
        info!(dir = %config.cache_dir.display(), "opened data cache");
        Self::new(root)
    }

    /// In-memory cache, for tests.
    pub fn memory() -> RegistryResult<Self> {
        Self::new(ObjectStoreBucket::memory())
    }

    pub fn modules(&self) -> Arc<ModuleDataStore> {
        self.modules.clone()
    }

    pub fn plugins(&self) -> Arc<PluginDataStore> {
        self.plugins.clone()
    }

    /// Module provider that consults this cache before `delegate`.
    pub fn module_provider(
        &self,
        delegate: Arc<dyn DataProvider<ModuleData>>,
    ) -> CachingProvider<ModuleData> {
        CachingProvider::new(self.modules.clone(), delegate)
    }

    /// Plugin provider that consults this cache before `delegate`.
    pub fn plugin_provider(
        &self,
        delegate: Arc<dyn DataProvider<PluginData>>,
    ) -> CachingProvider<PluginData> {
        CachingProvider::new(self.plugins.clone(), delegate)
    }

    /// Delete everything in the cache. Returns the number of objects removed.
    pub async fn clear(&self, cancel: &CancellationToken) -> RegistryResult<usize> {
        let removed = delete_all(cancel, &self.root, "").await?;
        info!(removed, "cleared data cache");
        Ok(removed)
    }
}
