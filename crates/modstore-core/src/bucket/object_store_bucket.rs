//! Bucket backed by the `object_store` crate.
//!
//! Supports a local directory (cache roots) and an in-memory store (tests).
//! Local writes go through a temporary file and a rename, so readers never
//! observe a partially written object.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{matches_prefix, ObjectInfo, ReadBucket, WriteBucket};
use crate::cancel::run_cancellable;
use crate::error::{CasError, CasResult};
use crate::path::validate_path;

/// Read/write bucket over any [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBucket {
    inner: Arc<dyn ObjectStore>,
    /// Normalized prefix every key lives under (empty for the store root).
    prefix: String,
}

impl ObjectStoreBucket {
    /// Wrap a store, scoping every key under `prefix`.
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: &str) -> CasResult<Self> {
        let prefix = prefix.trim_matches('/').to_string();
        if !prefix.is_empty() {
            validate_path(&prefix)?;
        }
        Ok(Self { inner, prefix })
    }

    /// Create an in-memory bucket for testing.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(object_store::memory::InMemory::new()),
            prefix: String::new(),
        }
    }

    /// Create a bucket rooted at a local directory, creating it if needed.
    pub fn local(dir: impl AsRef<std::path::Path>) -> CasResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(dir)
            .map_err(CasError::ObjectStore)?;
        debug!(dir = %dir.display(), "opened local bucket");
        Ok(Self {
            inner: Arc::new(store),
            prefix: String::new(),
        })
    }

    /// A bucket scoped to a sub-directory of this one, sharing the store.
    pub fn sub_bucket(&self, prefix: &str) -> CasResult<Self> {
        let prefix = prefix.trim_matches('/');
        validate_path(prefix)?;
        let joined = if self.prefix.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", self.prefix, prefix)
        };
        Self::new(self.inner.clone(), &joined)
    }

    fn location(&self, path: &str) -> CasResult<Path> {
        validate_path(path)?;
        self.full_location(path)
    }

    fn full_location(&self, path: &str) -> CasResult<Path> {
        let full = match (self.prefix.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, path),
        };
        Path::parse(&full).map_err(|e| CasError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn relative(&self, location: &Path) -> Option<String> {
        let full = location.as_ref();
        if self.prefix.is_empty() {
            return Some(full.to_string());
        }
        full.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(String::from)
    }
}

#[async_trait]
impl ReadBucket for ObjectStoreBucket {
    async fn get(&self, cancel: &CancellationToken, path: &str) -> CasResult<Bytes> {
        let location = self.location(path)?;
        run_cancellable(cancel, async {
            let result = self
                .inner
                .get(&location)
                .await
                .map_err(|e| CasError::from_object_store(e, path))?;
            result
                .bytes()
                .await
                .map_err(|e| CasError::from_object_store(e, path))
        })
        .await
    }

    async fn exists(&self, cancel: &CancellationToken, path: &str) -> CasResult<bool> {
        let location = self.location(path)?;
        run_cancellable(cancel, async {
            match self.inner.head(&location).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(CasError::ObjectStore(e)),
            }
        })
        .await
    }

    async fn list(&self, cancel: &CancellationToken, prefix: &str) -> CasResult<Vec<ObjectInfo>> {
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            validate_path(prefix)?;
        }
        let root = if self.prefix.is_empty() && prefix.is_empty() {
            None
        } else {
            Some(self.full_location(prefix)?)
        };

        let mut entries = run_cancellable(cancel, async {
            match self.inner.list(root.as_ref()).try_collect::<Vec<_>>().await {
                Ok(entries) => Ok(entries),
                Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
                Err(e) => Err(CasError::ObjectStore(e)),
            }
        })
        .await?;

        // Listing only descends; a prefix naming an object lists the object.
        if let (false, Some(location)) = (prefix.is_empty(), root.as_ref()) {
            let head = run_cancellable(cancel, async {
                match self.inner.head(location).await {
                    Ok(meta) => Ok(Some(meta)),
                    Err(object_store::Error::NotFound { .. }) => Ok(None),
                    Err(e) => Err(CasError::ObjectStore(e)),
                }
            })
            .await?;
            entries.extend(head);
        }

        let infos: BTreeMap<String, ObjectInfo> = entries
            .iter()
            .filter_map(|meta| {
                self.relative(&meta.location).map(|path| ObjectInfo {
                    path,
                    size: Some(meta.size),
                })
            })
            .filter(|info| matches_prefix(&info.path, prefix))
            .map(|info| (info.path.clone(), info))
            .collect();
        Ok(infos.into_values().collect())
    }
}

#[async_trait]
impl WriteBucket for ObjectStoreBucket {
    async fn put(&self, cancel: &CancellationToken, path: &str, content: Bytes) -> CasResult<()> {
        let location = self.location(path)?;
        run_cancellable(cancel, async {
            self.inner
                .put(&location, PutPayload::from_bytes(content))
                .await
                .map_err(|e| CasError::from_object_store(e, path))
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, cancel: &CancellationToken, path: &str) -> CasResult<()> {
        let location = self.location(path)?;
        run_cancellable(cancel, async {
            match self.inner.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(CasError::ObjectStore(e)),
            }
        })
        .await
    }
}
