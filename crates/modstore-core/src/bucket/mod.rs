//! Bucket abstraction: a path-keyed blob store.
//!
//! The manifest and cache layers treat a bucket as an opaque key-value store
//! with `/`-separated relative keys. Whether it is backed by a directory, an
//! in-memory map or a manifest plus blob set is invisible to them.
//!
//! # Implementations
//!
//! - [`ObjectStoreBucket`]: read/write, backed by the `object_store` crate
//!   (local filesystem or in-memory)
//! - [`ManifestBucket`]: read-only view assembled from a manifest and a blob set

pub mod manifest_bucket;
pub mod object_store_bucket;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::cancel::check_cancelled;
use crate::error::CasResult;

pub use manifest_bucket::{BucketOptions, ManifestBucket};
pub use object_store_bucket::ObjectStoreBucket;

/// An object listed by a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Normalized relative path.
    pub path: String,
    /// Size in bytes, when the backend knows it without reading.
    pub size: Option<u64>,
}

/// Read access to a bucket.
///
/// Every call takes the caller's [`CancellationToken`]; a cancelled call
/// fails with [`CasError::Cancelled`](crate::CasError::Cancelled).
#[async_trait]
pub trait ReadBucket: Send + Sync {
    /// Read an object's full content.
    ///
    /// A missing object is [`CasError::NotFound`](crate::CasError::NotFound).
    async fn get(&self, cancel: &CancellationToken, path: &str) -> CasResult<Bytes>;

    /// Check whether an object exists.
    async fn exists(&self, cancel: &CancellationToken, path: &str) -> CasResult<bool>;

    /// List objects at or below `prefix` (empty for everything), sorted by path.
    ///
    /// A prefix naming an object lists that object.
    async fn list(&self, cancel: &CancellationToken, prefix: &str) -> CasResult<Vec<ObjectInfo>>;

    /// Visit every object at or below `prefix` in path order.
    ///
    /// The first error returned by `visit` stops the walk.
    async fn walk(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
        visit: &mut (dyn for<'v> FnMut(&'v ObjectInfo) -> CasResult<()> + Send),
    ) -> CasResult<()> {
        for info in self.list(cancel, prefix).await? {
            check_cancelled(cancel)?;
            visit(&info)?;
        }
        Ok(())
    }
}

/// Write access to a bucket.
#[async_trait]
pub trait WriteBucket: Send + Sync {
    /// Write an object, replacing any existing content.
    async fn put(&self, cancel: &CancellationToken, path: &str, content: Bytes) -> CasResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, cancel: &CancellationToken, path: &str) -> CasResult<()>;
}

/// A bucket that can be read and written.
pub trait Bucket: ReadBucket + WriteBucket {}

impl<T: ReadBucket + WriteBucket> Bucket for T {}

#[async_trait]
impl<B: ReadBucket + ?Sized> ReadBucket for Arc<B> {
    async fn get(&self, cancel: &CancellationToken, path: &str) -> CasResult<Bytes> {
        (**self).get(cancel, path).await
    }

    async fn exists(&self, cancel: &CancellationToken, path: &str) -> CasResult<bool> {
        (**self).exists(cancel, path).await
    }

    async fn list(&self, cancel: &CancellationToken, prefix: &str) -> CasResult<Vec<ObjectInfo>> {
        (**self).list(cancel, prefix).await
    }
}

#[async_trait]
impl<B: WriteBucket + ?Sized> WriteBucket for Arc<B> {
    async fn put(&self, cancel: &CancellationToken, path: &str, content: Bytes) -> CasResult<()> {
        (**self).put(cancel, path, content).await
    }

    async fn delete(&self, cancel: &CancellationToken, path: &str) -> CasResult<()> {
        (**self).delete(cancel, path).await
    }
}

/// Delete every object at or below `prefix`, returning how many were removed.
pub async fn delete_all<B: Bucket + ?Sized>(
    cancel: &CancellationToken,
    bucket: &B,
    prefix: &str,
) -> CasResult<usize> {
    let objects = bucket.list(cancel, prefix).await?;
    for info in &objects {
        bucket.delete(cancel, &info.path).await?;
    }
    Ok(objects.len())
}

pub(crate) fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("a/b.proto", ""));
        assert!(matches_prefix("a/b.proto", "a"));
        assert!(matches_prefix("a/b.proto", "a/"));
        assert!(matches_prefix("a/b.proto", "a/b.proto"));
        assert!(!matches_prefix("ab/c.proto", "a"));
        assert!(!matches_prefix("b/a.proto", "a"));
    }

    #[tokio::test]
    async fn test_walk_visits_in_order_and_stops_on_error() {
        let cancel = CancellationToken::new();
        let bucket = ObjectStoreBucket::memory();
        for path in ["b.proto", "a.proto", "c/d.proto"] {
            bucket
                .put(&cancel, path, Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        bucket
            .walk(&cancel, "", &mut |info| {
                seen.push(info.path.clone());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["a.proto", "b.proto", "c/d.proto"]);

        let mut count = 0;
        let err = bucket
            .walk(&cancel, "", &mut |info| {
                count += 1;
                Err(crate::CasError::NotFound {
                    path: info.path.clone(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(count, 1);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_walk_cancelled() {
        let cancel = CancellationToken::new();
        let bucket = ObjectStoreBucket::memory();
        bucket
            .put(&cancel, "a.proto", Bytes::from_static(b"x"))
            .await
            .unwrap();

        cancel.cancel();
        let mut visited = 0;
        let err = bucket
            .walk(&cancel, "", &mut |_| {
                visited += 1;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(visited, 0);
    }

    #[tokio::test]
    async fn test_delete_all_under_prefix() {
        let cancel = CancellationToken::new();
        let bucket: Arc<dyn Bucket> = Arc::new(ObjectStoreBucket::memory());
        for path in ["keep.proto", "drop/a.proto", "drop/b/c.proto"] {
            bucket
                .put(&cancel, path, Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        let deleted = delete_all(&cancel, &bucket, "drop").await.unwrap();
        assert_eq!(deleted, 2);
        let remaining: Vec<_> = bucket
            .list(&cancel, "")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(remaining, vec!["keep.proto"]);
    }
}
