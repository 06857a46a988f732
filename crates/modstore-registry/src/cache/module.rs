//! Modules: a manifest per commit plus shared content-addressed file blobs.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use modstore_core::{check_cancelled, verify_content, Bucket, CasError, ReadBucket, WriteBucket};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::keys::{blob_path, commit_key_path, MANIFEST_EXT};
use super::DataStore;
use crate::data::{CommitKey, ModuleData};
use crate::error::RegistryResult;

/// [`DataStore`] for [`ModuleData`] over any bucket.
///
/// A manifest is written only after all of its blobs, so a present manifest
/// means a complete entry unless the directory was modified externally.
pub struct ModuleDataStore {
    bucket: Arc<dyn Bucket>,
}

impl ModuleDataStore {
    pub fn new(bucket: Arc<dyn Bucket>) -> Self {
        Self { bucket }
    }
}

impl fmt::Debug for ModuleDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDataStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataStore<ModuleData> for ModuleDataStore {
    async fn get(
        &self,
        cancel: &CancellationToken,
        keys: &[CommitKey],
    ) -> RegistryResult<(Vec<ModuleData>, Vec<CommitKey>)> {
        let mut found = Vec::new();
        let mut not_found = Vec::new();

        for key in keys {
            check_cancelled(cancel)?;
            let path = commit_key_path(key, Some(MANIFEST_EXT));
            match self.bucket.get(cancel, &path).await {
                Ok(manifest) => {
                    debug!(key = %key, path = %path, "module cache hit");
                    let blobs: Arc<dyn ReadBucket> = Arc::new(self.bucket.clone());
                    found.push(ModuleData::from_store(key.clone(), manifest, blobs));
                }
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, "module cache miss");
                    not_found.push(key.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((found, not_found))
    }

    async fn put(&self, cancel: &CancellationToken, items: &[ModuleData]) -> RegistryResult<()> {
        for item in items {
            let manifest_bytes = item.manifest_bytes(cancel).await?;
            let manifest = item.manifest(cancel).await?;
            let blob_set = item.blob_set(cancel).await?;

            let mut written = BTreeSet::new();
            for (path, digest) in manifest.entries() {
                if !written.insert(digest) {
                    continue;
                }
                let blob = blob_set.blob(digest).ok_or_else(|| CasError::MissingBlob {
                    path: path.to_string(),
                    digest: digest.to_string(),
                })?;
                let content = blob.open(cancel).await?;
                verify_content(path, digest, &content)?;
                self.bucket.put(cancel, &blob_path(digest), content).await?;
            }

            let path = commit_key_path(item.key(), Some(MANIFEST_EXT));
            self.bucket.put(cancel, &path, manifest_bytes).await?;
            debug!(
                key = %item.key(),
                path = %path,
                blobs = written.len(),
                "cached module"
            );
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
    use modstore_core::{Blob, BlobSet, Digester, Manifest, MemoryBlob, ObjectStoreBucket};

    fn module(files: &[(&str, &'static str)]) -> ModuleData {
        let digester = Digester::default();
        let blobs: Vec<MemoryBlob> = files
            .iter()
            .map(|(_, content)| MemoryBlob::from_content(&digester, *content))
            .collect();
        let manifest = Manifest::from_entries(
            files
                .iter()
                .zip(&blobs)
                .map(|((path, _), blob)| (*path, blob.digest().clone())),
        )
        .unwrap();
        let key = CommitKey::new(
            FullName::parse("buf.build/acme/weather", None).unwrap(),
            CommitId::new_random(),
            manifest.digest(&digester),
        );
        ModuleData::from_parts(
            key,
            Bytes::from(manifest.to_text()),
            BlobSet::from_memory_blobs(blobs).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let bucket = Arc::new(ObjectStoreBucket::memory());
        let store = ModuleDataStore::new(bucket.clone());
        let cancel = CancellationToken::new();
        let original = module(&[
            ("acme/weather/v1/weather.proto", "message Weather {}"),
            ("acme/weather/v1/copy.proto", "message Weather {}"),
            ("buf.yaml", "version: v2"),
        ]);

        store.put(&cancel, &[original.clone()]).await.unwrap();
        // Two distinct blobs plus one manifest.
        assert_eq!(bucket.list(&cancel, "").await.unwrap().len(), 3);

        let (found, not_found) = store.get(&cancel, &[original.key().clone()]).await.unwrap();
        assert!(not_found.is_empty());
        let cached = &found[0];
        assert_eq!(
            cached.manifest_bytes(&cancel).await.unwrap(),
            original.manifest_bytes(&cancel).await.unwrap()
        );

        let files = cached.bucket(&cancel).await.unwrap();
        assert_eq!(
            files.get(&cancel, "acme/weather/v1/copy.proto").await.unwrap(),
            Bytes::from_static(b"message Weather {}")
        );
        assert_eq!(
            files.get(&cancel, "buf.yaml").await.unwrap(),
            Bytes::from_static(b"version: v2")
        );
    }

    #[tokio::test]
    async fn test_put_rejects_tampered_manifest() {
        let bucket = Arc::new(ObjectStoreBucket::memory());
        let store = ModuleDataStore::new(bucket.clone());
        let cancel = CancellationToken::new();
        let genuine = module(&[("a.proto", "a")]);
        let forged = ModuleData::from_parts(
            genuine.key().clone(),
            Bytes::from_static(b"forged manifest\n"),
            BlobSet::default(),
        );

        let err = store.put(&cancel, &[forged]).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch(_)));
        assert!(bucket.list(&cancel, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_rejects_missing_blob() {
        let store = ModuleDataStore::new(Arc::new(ObjectStoreBucket::memory()));
        let cancel = CancellationToken::new();
        let complete = module(&[("a.proto", "a")]);
        let partial = ModuleData::from_parts(
            complete.key().clone(),
            complete.manifest_bytes(&cancel).await.unwrap(),
            BlobSet::default(),
        );

        let err = store.put(&cancel, &[partial]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_corrupted_blob_fails_on_read() {
        let bucket = Arc::new(ObjectStoreBucket::memory());
        let store = ModuleDataStore::new(bucket.clone());
        let cancel = CancellationToken::new();
        let original = module(&[("a.proto", "message A {}")]);
        store.put(&cancel, &[original.clone()]).await.unwrap();

        let digest = Digester::default().digest_bytes(b"message A {}");
        bucket
            .put(
                &cancel,
                &blob_path(&digest),
                Bytes::from_static(b"message Evil {}"),
            )
            .await
            .unwrap();

        let (found, _) = store.get(&cancel, &[original.key().clone()]).await.unwrap();
        let files = found[0].bucket(&cancel).await.unwrap();
        let err = files.get(&cancel, "a.proto").await.unwrap_err();
        assert!(matches!(
            err,
            CasError::ContentMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_io_error_aborts_batch() {
        let cancel = CancellationToken::new();
        let first = module(&[("a.proto", "message A {}")]);
        let second = module(&[("b.proto", "message B {}")]);

        let healthy = ObjectStoreBucket::memory();
        ModuleDataStore::new(Arc::new(healthy.clone()))
            .put(&cancel, &[first.clone(), second.clone()])
            .await
            .unwrap();

        // Reads of the second manifest fail.
        let broken = Arc::new(FailingBucket::new(
            healthy.clone(),
            commit_key_path(second.key(), Some(MANIFEST_EXT)),
        ));
        let err = ModuleDataStore::new(broken)
            .get(&cancel, &[first.key().clone(), second.key().clone()])
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Writes of the second module's only blob fail.
        let digest = Digester::default().digest_bytes(b"message B {}");
        let broken = Arc::new(FailingBucket::new(healthy, blob_path(&digest)));
        let err = ModuleDataStore::new(broken.clone())
            .put(&cancel, &[first, second])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(broken.failures(), 1);
    }
}
