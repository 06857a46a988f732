//! Read-only bucket assembled from a manifest and a blob set.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{matches_prefix, ObjectInfo, ReadBucket};
use crate::blob::{verify_content, BlobSet};
use crate::cancel::check_cancelled;
use crate::digest::Digest;
use crate::error::{CasError, CasResult};
use crate::manifest::Manifest;

/// Checks applied when a [`ManifestBucket`] is constructed.
///
/// Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketOptions {
    all_blobs_present: bool,
    no_extra_blobs: bool,
}

impl BucketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a blob for every manifest digest.
    pub fn validate_all_blobs_present(mut self) -> Self {
        self.all_blobs_present = true;
        self
    }

    /// Require every blob to be referenced by the manifest.
    pub fn validate_no_extra_blobs(mut self) -> Self {
        self.no_extra_blobs = true;
        self
    }

    /// Both checks on.
    pub fn strict() -> Self {
        Self::new()
            .validate_all_blobs_present()
            .validate_no_extra_blobs()
    }

    pub fn checks_all_blobs_present(&self) -> bool {
        self.all_blobs_present
    }

    pub fn checks_no_extra_blobs(&self) -> bool {
        self.no_extra_blobs
    }
}

/// Each manifest path reads as the blob its digest names.
#[derive(Debug, Clone)]
pub struct ManifestBucket {
    manifest: Manifest,
    blob_set: BlobSet,
}

impl ManifestBucket {
    /// Assemble a bucket. Performs no I/O.
    pub fn new(manifest: Manifest, blob_set: BlobSet, options: BucketOptions) -> CasResult<Self> {
        if options.all_blobs_present {
            if let Some((path, digest)) = manifest
                .entries()
                .find(|(_, digest)| !blob_set.contains(digest))
            {
                warn!(path, %digest, "manifest references a missing blob");
                return Err(CasError::MissingBlob {
                    path: path.to_string(),
                    digest: digest.to_string(),
                });
            }
        }

        if options.no_extra_blobs {
            let referenced: BTreeSet<&Digest> = manifest.entries().map(|(_, d)| d).collect();
            let extra: Vec<String> = blob_set
                .digests()
                .filter(|d| !referenced.contains(d))
                .map(ToString::to_string)
                .collect();
            if !extra.is_empty() {
                warn!(count = extra.len(), "blob set has unreferenced blobs");
                return Err(CasError::ExtraBlobs { digests: extra });
            }
        }

        debug!(
            files = manifest.len(),
            blobs = blob_set.len(),
            "assembled manifest bucket"
        );
        Ok(Self { manifest, blob_set })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn blob_set(&self) -> &BlobSet {
        &self.blob_set
    }

    pub fn into_parts(self) -> (Manifest, BlobSet) {
        (self.manifest, self.blob_set)
    }
}

#[async_trait]
impl ReadBucket for ManifestBucket {
    async fn get(&self, cancel: &CancellationToken, path: &str) -> CasResult<Bytes> {
        let digest = self
            .manifest
            .digest_for(path)
            .ok_or_else(|| CasError::NotFound {
                path: path.to_string(),
            })?;
        let blob = self
            .blob_set
            .blob(digest)
            .ok_or_else(|| CasError::MissingBlob {
                path: path.to_string(),
                digest: digest.to_string(),
            })?;
        let content = blob.open(cancel).await?;
        verify_content(path, digest, &content)?;
        Ok(content)
    }

    async fn exists(&self, cancel: &CancellationToken, path: &str) -> CasResult<bool> {
        check_cancelled(cancel)?;
        Ok(self.manifest.digest_for(path).is_some())
    }

    async fn list(&self, cancel: &CancellationToken, prefix: &str) -> CasResult<Vec<ObjectInfo>> {
        check_cancelled(cancel)?;
        Ok(self
            .manifest
            .paths()
            .filter(|path| matches_prefix(path, prefix))
            .map(|path| ObjectInfo {
                path: path.to_string(),
                size: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{Blob, MemoryBlob};
    use crate::digest::Digester;
    use std::sync::Arc;

    fn blob(content: &'static str) -> MemoryBlob {
        MemoryBlob::from_content(&Digester::default(), content)
    }

    fn manifest_for(entries: &[(&str, &MemoryBlob)]) -> Manifest {
        Manifest::from_entries(
            entries
                .iter()
                .map(|(path, blob)| (*path, blob.digest().clone())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_through_manifest() {
        let a = blob("message A {}");
        let b = blob("message B {}");
        let manifest = manifest_for(&[("a.proto", &a), ("dir/b.proto", &b), ("copy.proto", &a)]);
        let blobs = BlobSet::from_memory_blobs(vec![a.clone(), b.clone()]).unwrap();

        let bucket = ManifestBucket::new(manifest, blobs, BucketOptions::strict()).unwrap();
        let cancel = CancellationToken::new();

        assert_eq!(
            bucket.get(&cancel, "copy.proto").await.unwrap(),
            a.content().clone()
        );
        assert_eq!(
            bucket.get(&cancel, "dir/b.proto").await.unwrap(),
            b.content().clone()
        );
        assert!(bucket.exists(&cancel, "a.proto").await.unwrap());
        assert!(!bucket.exists(&cancel, "b.proto").await.unwrap());
        assert!(bucket
            .get(&cancel, "b.proto")
            .await
            .unwrap_err()
            .is_not_found());

        let listed: Vec<_> = bucket
            .list(&cancel, "dir")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(listed, vec!["dir/b.proto"]);
    }

    #[test]
    fn test_missing_blob_validation() {
        let a = blob("a");
        let b = blob("b");
        let manifest = manifest_for(&[("a.proto", &a), ("b.proto", &b)]);
        let blobs = BlobSet::from_memory_blobs(vec![a]).unwrap();

        let err = ManifestBucket::new(
            manifest.clone(),
            blobs.clone(),
            BucketOptions::new().validate_all_blobs_present(),
        )
        .unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, CasError::MissingBlob { ref path, .. } if path == "b.proto"));

        ManifestBucket::new(manifest, blobs, BucketOptions::default()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_blob_surfaces_on_read() {
        let a = blob("a");
        let b = blob("b");
        let manifest = manifest_for(&[("a.proto", &a), ("b.proto", &b)]);
        let blobs = BlobSet::from_memory_blobs(vec![a]).unwrap();
        let bucket = ManifestBucket::new(manifest, blobs, BucketOptions::default()).unwrap();

        let cancel = CancellationToken::new();
        bucket.get(&cancel, "a.proto").await.unwrap();
        let err = bucket.get(&cancel, "b.proto").await.unwrap_err();
        assert!(matches!(err, CasError::MissingBlob { .. }));

        cancel.cancel();
        assert!(bucket
            .get(&cancel, "a.proto")
            .await
            .unwrap_err()
            .is_cancelled());
    }

    #[test]
    fn test_extra_blob_validation() {
        let a = blob("a");
        let stray = blob("stray");
        let manifest = manifest_for(&[("a.proto", &a)]);
        let blobs = BlobSet::from_memory_blobs(vec![a, stray.clone()]).unwrap();

        let err = ManifestBucket::new(
            manifest.clone(),
            blobs.clone(),
            BucketOptions::new().validate_no_extra_blobs(),
        )
        .unwrap_err();
        match err {
            CasError::ExtraBlobs { digests } => {
                assert_eq!(digests, vec![stray.digest().to_string()]);
            }
            other => panic!("expected ExtraBlobs, got {:?}", other),
        }

        ManifestBucket::new(
            manifest,
            blobs,
            BucketOptions::new().validate_all_blobs_present(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_read_detects_tampered_blob() {
        let real = blob("real");
        let forged: Arc<dyn Blob> =
            Arc::new(MemoryBlob::new(real.digest().clone(), "forged", false).unwrap());
        let manifest = manifest_for(&[("a.proto", &real)]);
        let cancel = CancellationToken::new();
        let blobs = BlobSet::new(&cancel, vec![forged]).await.unwrap();

        let bucket = ManifestBucket::new(manifest, blobs, BucketOptions::strict()).unwrap();
        let err = bucket.get(&cancel, "a.proto").await.unwrap_err();
        assert!(matches!(err, CasError::ContentMismatch { ref subject, .. } if subject == "a.proto"));
    }
}
