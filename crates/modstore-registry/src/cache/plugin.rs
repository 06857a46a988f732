//! Plugin binaries, one object per commit.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use modstore_core::{check_cancelled, Bucket, ReadBucket, WriteBucket};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::keys::{commit_key_path, PLUGIN_EXT};
use super::DataStore;
use crate::data::{CommitKey, PluginData};
use crate::error::RegistryResult;

/// [`DataStore`] for [`PluginData`] over any bucket.
pub struct PluginDataStore {
    bucket: Arc<dyn Bucket>,
}

impl PluginDataStore {
    pub fn new(bucket: Arc<dyn Bucket>) -> Self {
        Self { bucket }
    }
}

impl fmt::Debug for PluginDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDataStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataStore<PluginData> for PluginDataStore {
    async fn get(
        &self,
        cancel: &CancellationToken,
        keys: &[CommitKey],
    ) -> RegistryResult<(Vec<PluginData>, Vec<CommitKey>)> {
        let mut found = Vec::new();
        let mut not_found = Vec::new();

        for key in keys {
            check_cancelled(cancel)?;
            let path = commit_key_path(key, Some(PLUGIN_EXT));
            match self.bucket.get(cancel, &path).await {
                Ok(content) => {
                    debug!(key = %key, path = %path, "plugin cache hit");
                    found.push(PluginData::from_bytes(key.clone(), content));
                }
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, "plugin cache miss");
                    not_found.push(key.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((found, not_found))
    }

    async fn put(&self, cancel: &CancellationToken, items: &[PluginData]) -> RegistryResult<()> {
        for item in items {
            let content = item.data(cancel).await?;
            let path = commit_key_path(item.key(), Some(PLUGIN_EXT));
            self.bucket.put(cancel, &path, content).await?;
            debug!(key = %item.key(), path = %path, "cached plugin");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::FailingBucket;
    use crate::reference::{CommitId, FullName};
    use crate::RegistryError;
    use bytes::Bytes;
    use modstore_core::{Digester, ObjectStoreBucket};

    fn key(name: &str, content: &[u8]) -> CommitKey {
        CommitKey::new(
            FullName::new("buf.build", "acme", name).unwrap(),
            CommitId::new_random(),
            Digester::default().digest_bytes(content),
        )
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = PluginDataStore::new(Arc::new(ObjectStoreBucket::memory()));
        let cancel = CancellationToken::new();
        let stored = key("protoc-gen-go", b"\0asm go");
        let absent = key("protoc-gen-es", b"\0asm es");

        store
            .put(
                &cancel,
                &[PluginData::from_bytes(stored.clone(), Bytes::from_static(b"\0asm go"))],
            )
            .await
            .unwrap();

        let (found, not_found) = store
            .get(&cancel, &[absent.clone(), stored.clone()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key(), &stored);
        assert_eq!(
            found[0].data(&cancel).await.unwrap(),
            Bytes::from_static(b"\0asm go")
        );
        assert_eq!(not_found, vec![absent]);
    }

    #[tokio::test]
    async fn test_put_rejects_tampered_plugin() {
        let bucket = Arc::new(ObjectStoreBucket::memory());
        let store = PluginDataStore::new(bucket.clone());
        let cancel = CancellationToken::new();
        let key = key("protoc-gen-go", b"\0asm go");

        let err = store
            .put(
                &cancel,
                &[PluginData::from_bytes(key.clone(), Bytes::from_static(b"\0asm evil"))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch(_)));
        assert!(!bucket
            .exists(&cancel, &commit_key_path(&key, Some(PLUGIN_EXT)))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_entry_fails_on_read() {
        let bucket = Arc::new(ObjectStoreBucket::memory());
        let store = PluginDataStore::new(bucket.clone());
        let cancel = CancellationToken::new();
        let key = key("protoc-gen-go", b"\0asm go");

        bucket
            .put(
                &cancel,
                &commit_key_path(&key, Some(PLUGIN_EXT)),
                Bytes::from_static(b"bit rot"),
            )
            .await
            .unwrap();

        let (found, _) = store.get(&cancel, &[key]).await.unwrap();
        let err = found[0].data(&cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch(_)));
    }

    #[tokio::test]
    async fn test_io_error_aborts_batch() {
        let cancel = CancellationToken::new();
        let first = key("protoc-gen-go", b"\0asm go");
        let second = key("protoc-gen-es", b"\0asm es");
        let plugins = [
            PluginData::from_bytes(first.clone(), Bytes::from_static(b"\0asm go")),
            PluginData::from_bytes(second.clone(), Bytes::from_static(b"\0asm es")),
        ];

        let healthy = ObjectStoreBucket::memory();
        PluginDataStore::new(Arc::new(healthy.clone()))
            .put(&cancel, &plugins)
            .await
            .unwrap();

        let broken = Arc::new(FailingBucket::new(
            healthy,
            commit_key_path(&second, Some(PLUGIN_EXT)),
        ));
        let store = PluginDataStore::new(broken.clone());

        let err = store.get(&cancel, &[first, second]).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_not_found());

        let err = store.put(&cancel, &plugins).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(broken.failures(), 2);
    }
}
