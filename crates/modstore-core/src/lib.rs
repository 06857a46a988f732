//! Content-addressed storage primitives for module trees.
//!
//! This crate provides:
//!
//! - Typed digests (SHAKE256) and a streaming digester
//! - Blobs and deduplicating blob sets
//! - Manifests with a canonical, digestable text encoding
//! - Buckets: path-keyed stores over `object_store`, or assembled from a
//!   manifest plus blobs
//!
//! # Quick Start
//!
//! ```no_run
//! use modstore_core::{
//!     manifest_from_bucket, BucketOptions, Digester, ManifestBucket, ObjectStoreBucket,
//!     ReadBucket,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> modstore_core::CasResult<()> {
//! let source = ObjectStoreBucket::local("proto")?;
//! let cancel = CancellationToken::new();
//! let digester = Digester::default();
//!
//! let (manifest, blobs) = manifest_from_bucket(&cancel, &source, &digester).await?;
//! println!("module digest: {}", manifest.digest(&digester));
//!
//! let bucket = ManifestBucket::new(manifest, blobs, BucketOptions::strict())?;
//! let content = bucket.get(&cancel, "acme/weather/v1/weather.proto").await?;
//! # let _ = content;
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod bucket;
pub mod cancel;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod path;

pub use blob::{verify_content, Blob, BlobSet, BucketBlob, MemoryBlob};
pub use bucket::{
    delete_all, Bucket, BucketOptions, ManifestBucket, ObjectInfo, ObjectStoreBucket, ReadBucket,
    WriteBucket,
};
pub use cancel::{check_cancelled, run_cancellable};
pub use digest::{parse_digest, Digest, DigestType, Digester};
pub use error::{CasError, CasResult};
pub use manifest::{manifest_from_bucket, Manifest};
pub use path::{normalize_path, validate_path};
