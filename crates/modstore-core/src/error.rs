//! Error types for digests, manifests, blobs and buckets.

/// Errors produced by the content-addressed core.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// Digest bytes or hex payload are malformed.
    #[error("invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Digest type token is not one of the supported algorithms.
    #[error("unknown digest type: {digest_type:?}")]
    UnknownDigestType { digest_type: String },

    /// Path is not a normalized relative path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Manifest text could not be parsed.
    #[error("malformed manifest at line {line}: {reason}")]
    MalformedManifest { line: usize, reason: String },

    /// The same path was added twice with different digests.
    #[error("duplicate manifest path {path:?}")]
    DuplicatePath { path: String },

    /// Object does not exist in a bucket.
    #[error("{path}: file does not exist")]
    NotFound { path: String },

    /// A manifest entry references a digest that has no blob.
    #[error("{path}: file does not exist: no blob for digest {digest}")]
    MissingBlob { path: String, digest: String },

    /// The blob set carries blobs no manifest entry references.
    #[error("blob set has {} blob(s) not referenced by the manifest: {}", .digests.len(), .digests.join(", "))]
    ExtraBlobs { digests: Vec<String> },

    /// Two blobs share a digest but carry different content.
    ///
    /// `mismatched` holds the actual digests of the sides that do not hash
    /// to `digest`; it is empty only for a true hash collision.
    #[error("blob collision: different content found for digest {digest}")]
    BlobCollision {
        digest: String,
        mismatched: Vec<String>,
    },

    /// Content did not hash to the digest it was stored under.
    #[error("content mismatch for {subject}: expected {expected}, got {actual}")]
    ContentMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O failure, passed through unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by the object store backend.
    #[error("object store error: {0}")]
    ObjectStore(object_store::Error),
}

impl CasError {
    /// Whether this is a "does not exist" condition a caller may fall back from.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MissingBlob { .. })
    }

    /// Whether the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this is a parse failure of external input.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDigest { .. }
                | Self::UnknownDigestType { .. }
                | Self::InvalidPath { .. }
                | Self::MalformedManifest { .. }
        )
    }

    /// Map an object store error for a given path, keeping not-found distinguishable.
    pub fn from_object_store(err: object_store::Error, path: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound {
                path: path.to_string(),
            },
            other => Self::ObjectStore(other),
        }
    }
}

impl From<object_store::Error> for CasError {
    fn from(err: object_store::Error) -> Self {
        Self::from_object_store(err, "unknown")
    }
}

/// Result type for core operations.
pub type CasResult<T> = Result<T, CasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_flavors() {
        let missing = CasError::MissingBlob {
            path: "a.proto".to_string(),
            digest: "shake256:00".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(missing.to_string().contains("does not exist"));

        let not_found = CasError::NotFound {
            path: "b.proto".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!CasError::Cancelled.is_not_found());
    }

    #[test]
    fn test_extra_blobs_message() {
        let err = CasError::ExtraBlobs {
            digests: vec!["shake256:aa".to_string(), "shake256:bb".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "blob set has 2 blob(s) not referenced by the manifest: shake256:aa, shake256:bb"
        );
    }

    #[test]
    fn test_object_store_not_found_maps_to_not_found() {
        let err = object_store::Error::NotFound {
            path: "x".to_string(),
            source: "gone".into(),
        };
        let mapped = CasError::from_object_store(err, "x/y.proto");
        assert!(matches!(mapped, CasError::NotFound { ref path } if path == "x/y.proto"));
    }
}
