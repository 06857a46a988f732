//! Commit keys and the payloads fetched for them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use modstore_core::{
    Blob, BlobSet, BucketBlob, BucketOptions, Digest, Manifest, ManifestBucket, ReadBucket,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::cache::keys::blob_path;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::{CommitId, FullName};
use crate::verify::{DataKind, VerifiedPayload};

/// Identifies one commit's content: who, which commit, and what it must hash to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitKey {
    pub full_name: FullName,
    pub commit_id: CommitId,
    pub digest: Digest,
}

impl CommitKey {
    pub fn new(full_name: FullName, commit_id: CommitId, digest: Digest) -> Self {
        Self {
            full_name,
            commit_id,
            digest,
        }
    }
}

impl fmt::Display for CommitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name, self.commit_id)
    }
}

/// Payload types that can be cached and fetched by [`CommitKey`].
pub trait CommitData: Clone + Send + Sync + 'static {
    fn commit_key(&self) -> &CommitKey;
}

/// A plugin binary.
///
/// Clones share the verification outcome.
#[derive(Debug, Clone)]
pub struct PluginData {
    payload: Arc<VerifiedPayload>,
}

impl PluginData {
    pub fn new<F, Fut>(key: CommitKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RegistryResult<Bytes>> + Send + 'static,
    {
        Self {
            payload: Arc::new(VerifiedPayload::new(DataKind::Plugin, key, fetch)),
        }
    }

    pub fn from_bytes(key: CommitKey, content: Bytes) -> Self {
        Self {
            payload: Arc::new(VerifiedPayload::from_bytes(DataKind::Plugin, key, content)),
        }
    }

    pub fn key(&self) -> &CommitKey {
        self.payload.key()
    }

    /// The verified plugin binary.
    pub async fn data(&self, cancel: &CancellationToken) -> RegistryResult<Bytes> {
        self.payload.data(cancel).await
    }

    pub fn is_verified(&self) -> Option<bool> {
        self.payload.is_verified()
    }
}

impl CommitData for PluginData {
    fn commit_key(&self) -> &CommitKey {
        self.key()
    }
}

/// Where a module's file blobs come from.
enum ModuleBlobs {
    /// Already assembled, e.g. from a download.
    Set(BlobSet),
    /// Content-addressed blobs in a cache bucket, read on first open.
    Store(Arc<dyn ReadBucket>),
}

impl fmt::Debug for ModuleBlobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(set) => f.debug_tuple("Set").field(&set.len()).finish(),
            Self::Store(_) => f.write_str("Store"),
        }
    }
}

/// A module: its manifest, verified against the key digest, plus file blobs.
///
/// The manifest is checked before it is parsed, and every file blob is
/// checked against its manifest digest when read. Clones share state.
#[derive(Debug, Clone)]
pub struct ModuleData {
    inner: Arc<ModuleInner>,
}

#[derive(Debug)]
struct ModuleInner {
    manifest: VerifiedPayload,
    blobs: ModuleBlobs,
    assembled: OnceCell<(Manifest, BlobSet)>,
}

impl ModuleData {
    /// Module whose manifest is fetched lazily and whose blobs are known.
    pub fn new<F, Fut>(key: CommitKey, fetch_manifest: F, blob_set: BlobSet) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RegistryResult<Bytes>> + Send + 'static,
    {
        Self::with_blobs(
            VerifiedPayload::new(DataKind::Module, key, fetch_manifest),
            ModuleBlobs::Set(blob_set),
        )
    }

    /// Module from in-memory manifest bytes and blobs.
    pub fn from_parts(key: CommitKey, manifest: Bytes, blob_set: BlobSet) -> Self {
        Self::with_blobs(
            VerifiedPayload::from_bytes(DataKind::Module, key, manifest),
            ModuleBlobs::Set(blob_set),
        )
    }

    /// Module read back from a cache bucket.
    pub(crate) fn from_store(key: CommitKey, manifest: Bytes, bucket: Arc<dyn ReadBucket>) -> Self {
        Self::with_blobs(
            VerifiedPayload::from_bytes(DataKind::Module, key, manifest),
            ModuleBlobs::Store(bucket),
        )
    }

    fn with_blobs(manifest: VerifiedPayload, blobs: ModuleBlobs) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                manifest,
                blobs,
                assembled: OnceCell::new(),
            }),
        }
    }

    pub fn key(&self) -> &CommitKey {
        self.inner.manifest.key()
    }

    /// Canonical manifest text, verified against the key digest.
    pub async fn manifest_bytes(&self, cancel: &CancellationToken) -> RegistryResult<Bytes> {
        self.inner.manifest.data(cancel).await
    }

    pub async fn manifest(&self, cancel: &CancellationToken) -> RegistryResult<Manifest> {
        Ok(self.assembled(cancel).await?.0.clone())
    }

    pub async fn blob_set(&self, cancel: &CancellationToken) -> RegistryResult<BlobSet> {
        Ok(self.assembled(cancel).await?.1.clone())
    }

    /// The module's file tree as a read-only bucket.
    ///
    /// Every manifest digest must have a blob; extra blobs are tolerated.
    pub async fn bucket(&self, cancel: &CancellationToken) -> RegistryResult<ManifestBucket> {
        let (manifest, blob_set) = self.assembled(cancel).await?;
        let bucket = ManifestBucket::new(
            manifest.clone(),
            blob_set.clone(),
            BucketOptions::new().validate_all_blobs_present(),
        )?;
        Ok(bucket)
    }

    pub fn is_verified(&self) -> Option<bool> {
        self.inner.manifest.is_verified()
    }

    async fn assembled(&self, cancel: &CancellationToken) -> RegistryResult<&(Manifest, BlobSet)> {
        self.inner
            .assembled
            .get_or_try_init(|| async {
                let bytes = self.inner.manifest.data(cancel).await?;
                let manifest = Manifest::from_bytes(&bytes)?;
                let blob_set = match &self.inner.blobs {
                    ModuleBlobs::Set(set) => set.clone(),
                    ModuleBlobs::Store(bucket) => {
                        store_blob_set(cancel, &manifest, bucket).await?
                    }
                };
                Ok::<_, RegistryError>((manifest, blob_set))
            })
            .await
    }
}

impl CommitData for ModuleData {
    fn commit_key(&self) -> &CommitKey {
        self.key()
    }
}

/// Lazily read blobs for every distinct digest in `manifest`.
async fn store_blob_set(
    cancel: &CancellationToken,
    manifest: &Manifest,
    bucket: &Arc<dyn ReadBucket>,
) -> RegistryResult<BlobSet> {
    let mut blobs: Vec<Arc<dyn Blob>> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for (_, digest) in manifest.entries() {
        if seen.insert(digest) {
            blobs.push(Arc::new(BucketBlob::new(
                digest.clone(),
                bucket.clone(),
                blob_path(digest),
            )));
        }
    }
    // Digests are distinct, so this never opens a blob.
    Ok(BlobSet::new(cancel, blobs).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modstore_core::{Digester, MemoryBlob};

    fn module_fixture() -> (CommitKey, Bytes, BlobSet) {
        let digester = Digester::default();
        let a = MemoryBlob::from_content(&digester, "syntax = \"proto3\";");
        let manifest =
            Manifest::from_entries(vec![("acme/weather/v1/weather.proto", a.digest().clone())])
                .unwrap();
        let key = CommitKey::new(
            FullName::parse("buf.build/acme/weather", None).unwrap(),
            CommitId::parse("a1b2c3d4e5f64a1b8c9d0e1f2a3b4c5d").unwrap(),
            manifest.digest(&digester),
        );
        let blobs = BlobSet::from_memory_blobs(vec![a]).unwrap();
        (key, Bytes::from(manifest.to_text()), blobs)
    }

    #[tokio::test]
    async fn test_module_bucket_reads_files() {
        let (key, manifest, blobs) = module_fixture();
        let module = ModuleData::from_parts(key, manifest, blobs);
        let cancel = CancellationToken::new();

        let bucket = module.bucket(&cancel).await.unwrap();
        assert_eq!(
            bucket.get(&cancel, "acme/weather/v1/weather.proto").await.unwrap(),
            Bytes::from_static(b"syntax = \"proto3\";")
        );
        assert_eq!(module.manifest(&cancel).await.unwrap().len(), 1);
        assert_eq!(module.is_verified(), Some(true));
    }

    #[tokio::test]
    async fn test_module_with_tampered_manifest() {
        let (key, _, blobs) = module_fixture();
        let module = ModuleData::from_parts(
            key,
            Bytes::from_static(b"not the manifest that was pinned\n"),
            blobs,
        );
        let cancel = CancellationToken::new();

        let err = module.bucket(&cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch(_)));
        // Same outcome again, without a parse error sneaking in.
        let err = module.manifest(&cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch(_)));
    }

    #[tokio::test]
    async fn test_plugin_clones_share_verification() {
        let digest = Digester::default().digest_bytes(b"\0asm");
        let key = CommitKey::new(
            FullName::parse("buf.build/acme/protoc-gen-x", None).unwrap(),
            CommitId::new_random(),
            digest,
        );
        let plugin = PluginData::from_bytes(key, Bytes::from_static(b"\0asm"));
        let clone = plugin.clone();

        plugin.data(&CancellationToken::new()).await.unwrap();
        assert_eq!(clone.is_verified(), Some(true));
        assert_eq!(clone.commit_key(), plugin.key());
    }
}
