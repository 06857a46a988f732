//! Test buckets.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use modstore_core::{CasError, CasResult, ObjectInfo, ObjectStoreBucket, ReadBucket, WriteBucket};
use tokio_util::sync::CancellationToken;

/// A bucket whose reads and writes of one path fail with an I/O error.
pub(crate) struct FailingBucket {
    inner: ObjectStoreBucket,
    path: String,
    failures: AtomicUsize,
}

impl FailingBucket {
    pub(crate) fn new(inner: ObjectStoreBucket, path: impl Into<String>) -> Self {
        Self {
            inner,
            path: path.into(),
            failures: AtomicUsize::new(0),
        }
    }

    /// Number of calls that failed so far.
    pub(crate) fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> CasResult<()> {
        if path == self.path {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CasError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{path}: permission denied"),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadBucket for FailingBucket {
    async fn get(&self, cancel: &CancellationToken, path: &str) -> CasResult<Bytes> {
        self.check(path)?;
        self.inner.get(cancel, path).await
    }

    async fn exists(&self, cancel: &CancellationToken, path: &str) -> CasResult<bool> {
        self.check(path)?;
        self.inner.exists(cancel, path).await
    }

    async fn list(&self, cancel: &CancellationToken, prefix: &str) -> CasResult<Vec<ObjectInfo>> {
        self.inner.list(cancel, prefix).await
    }
}

#[async_trait]
impl WriteBucket for FailingBucket {
    async fn put(&self, cancel: &CancellationToken, path: &str, content: Bytes) -> CasResult<()> {
        self.check(path)?;
        self.inner.put(cancel, path, content).await
    }

    async fn delete(&self, cancel: &CancellationToken, path: &str) -> CasResult<()> {
        self.inner.delete(cancel, path).await
    }
}
