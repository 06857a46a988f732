//! Assembling module data from a registry download response.

use bytes::Bytes;
use modstore_core::{BlobSet, Digest, MemoryBlob};
use tracing::debug;

use crate::data::{CommitKey, ModuleData};
use crate::error::RegistryResult;

/// What a download call hands over for one module commit.
#[derive(Debug, Clone, Default)]
pub struct DownloadedModule {
    /// Canonical manifest text.
    pub manifest: Bytes,
    /// File contents keyed by digest.
    pub blobs: Vec<(Digest, Bytes)>,
}

impl DownloadedModule {
    pub fn new(manifest: impl Into<Bytes>) -> Self {
        Self {
            manifest: manifest.into(),
            blobs: Vec::new(),
        }
    }

    pub fn with_blob(mut self, digest: Digest, content: impl Into<Bytes>) -> Self {
        self.blobs.push((digest, content.into()));
        self
    }
}

impl ModuleData {
    /// Build module data for `key` from a download.
    ///
    /// Every blob is checked against its digest here. The manifest is
    /// checked against the key digest on first access.
    pub fn from_download(key: CommitKey, response: DownloadedModule) -> RegistryResult<Self> {
        let blob_count = response.blobs.len();
        let blobs = response
            .blobs
            .into_iter()
            .map(|(digest, content)| MemoryBlob::new(digest, content, true))
            .collect::<Result<Vec<_>, _>>()?;
        let blob_set = BlobSet::from_memory_blobs(blobs)?;

        debug!(
            key = %key,
            blobs = blob_count,
            distinct = blob_set.len(),
            "assembled downloaded module"
        );
        Ok(Self::from_parts(key, response.manifest, blob_set))
    }
}
