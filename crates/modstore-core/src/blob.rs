//! Blobs: digest-identified byte payloads, and sets of them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bucket::ReadBucket;
use crate::cancel::check_cancelled;
use crate::digest::{Digest, Digester};
use crate::error::{CasError, CasResult};

/// A digest plus content that can be opened any number of times.
#[async_trait]
pub trait Blob: Send + Sync + fmt::Debug {
    /// Digest the content is addressed by.
    fn digest(&self) -> &Digest;

    /// Read the full content.
    ///
    /// Implementations that fetch lazily must verify the content against
    /// [`Blob::digest`] before returning it.
    async fn open(&self, cancel: &CancellationToken) -> CasResult<Bytes>;
}

/// Check `content` against `digest`, naming `subject` in the error.
pub fn verify_content(subject: &str, digest: &Digest, content: &[u8]) -> CasResult<()> {
    let actual = Digester::new(digest.digest_type()).digest_bytes(content);
    if &actual != digest {
        warn!(
            subject,
            expected = %digest,
            actual = %actual,
            "content does not match its digest"
        );
        return Err(CasError::ContentMismatch {
            subject: subject.to_string(),
            expected: digest.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// A blob whose content is already in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlob {
    digest: Digest,
    content: Bytes,
}

impl MemoryBlob {
    /// Wrap content under a known digest, optionally verifying it first.
    pub fn new(digest: Digest, content: impl Into<Bytes>, validate: bool) -> CasResult<Self> {
        let content = content.into();
        if validate {
            verify_content("blob", &digest, &content)?;
        }
        Ok(Self { digest, content })
    }

    /// Wrap content, computing its digest.
    pub fn from_content(digester: &Digester, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let digest = digester.digest_bytes(&content);
        Self { digest, content }
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

#[async_trait]
impl Blob for MemoryBlob {
    fn digest(&self) -> &Digest {
        &self.digest
    }

    async fn open(&self, cancel: &CancellationToken) -> CasResult<Bytes> {
        check_cancelled(cancel)?;
        Ok(self.content.clone())
    }
}

/// A blob read from a bucket path on first open and kept afterwards.
///
/// The content is verified against the digest when it is first read. A
/// failed read is not remembered, so a later open tries again.
pub struct BucketBlob {
    digest: Digest,
    bucket: Arc<dyn ReadBucket>,
    path: String,
    content: OnceCell<Bytes>,
}

impl BucketBlob {
    pub fn new(digest: Digest, bucket: Arc<dyn ReadBucket>, path: impl Into<String>) -> Self {
        Self {
            digest,
            bucket,
            path: path.into(),
            content: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for BucketBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketBlob")
            .field("digest", &self.digest)
            .field("path", &self.path)
            .field("loaded", &self.content.initialized())
            .finish()
    }
}

#[async_trait]
impl Blob for BucketBlob {
    fn digest(&self) -> &Digest {
        &self.digest
    }

    async fn open(&self, cancel: &CancellationToken) -> CasResult<Bytes> {
        let content = self
            .content
            .get_or_try_init(|| async {
                let content = self.bucket.get(cancel, &self.path).await?;
                verify_content(&self.path, &self.digest, &content)?;
                Ok::<_, CasError>(content)
            })
            .await?;
        Ok(content.clone())
    }
}

/// Blobs indexed by digest, one entry per distinct digest.
///
/// Cloning is cheap; blobs are shared.
#[derive(Debug, Clone, Default)]
pub struct BlobSet {
    blobs: BTreeMap<Digest, Arc<dyn Blob>>,
}

impl BlobSet {
    /// Build a set, collapsing blobs with identical digests.
    ///
    /// Two blobs with the same digest are only read when they collide; if
    /// their contents differ the set is rejected with
    /// [`CasError::BlobCollision`].
    pub async fn new(cancel: &CancellationToken, blobs: Vec<Arc<dyn Blob>>) -> CasResult<Self> {
        let mut map: BTreeMap<Digest, Arc<dyn Blob>> = BTreeMap::new();
        for blob in blobs {
            match map.get(blob.digest()) {
                None => {
                    map.insert(blob.digest().clone(), blob);
                }
                Some(existing) => {
                    let existing_content = existing.open(cancel).await?;
                    let content = blob.open(cancel).await?;
                    check_collision(blob.digest(), &existing_content, &content)?;
                }
            }
        }
        Ok(Self { blobs: map })
    }

    /// Build a set from in-memory blobs without any I/O.
    pub fn from_memory_blobs(blobs: impl IntoIterator<Item = MemoryBlob>) -> CasResult<Self> {
        let mut map: BTreeMap<Digest, Arc<dyn Blob>> = BTreeMap::new();
        let mut contents: BTreeMap<Digest, Bytes> = BTreeMap::new();
        for blob in blobs {
            match contents.get(&blob.digest) {
                None => {
                    contents.insert(blob.digest.clone(), blob.content.clone());
                    map.insert(blob.digest.clone(), Arc::new(blob));
                }
                Some(existing) => check_collision(&blob.digest, existing, &blob.content)?,
            }
        }
        Ok(Self { blobs: map })
    }

    /// Look up a blob by digest.
    pub fn blob(&self, digest: &Digest) -> Option<&Arc<dyn Blob>> {
        self.blobs.get(digest)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.blobs.contains_key(digest)
    }

    /// Digests in sorted order.
    pub fn digests(&self) -> impl Iterator<Item = &Digest> {
        self.blobs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Blob>> {
        self.blobs.values()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

fn check_collision(digest: &Digest, existing: &[u8], candidate: &[u8]) -> CasResult<()> {
    if existing == candidate {
        return Ok(());
    }
    let digester = Digester::new(digest.digest_type());
    let mismatched: Vec<String> = [existing, candidate]
        .iter()
        .map(|content| digester.digest_bytes(content))
        .filter(|actual| actual != digest)
        .map(|actual| actual.to_string())
        .collect();
    warn!(
        digest = %digest,
        mismatched = ?mismatched,
        "different blob content under one digest"
    );
    Err(CasError::BlobCollision {
        digest: digest.to_string(),
        mismatched,
    })
}
