//! Error types for the module and plugin caches.

use modstore_core::CasError;

use crate::verify::DigestMismatchError;

/// Registry-side errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Neither the cache nor the delegate had data for a commit.
    #[error("not found: {name}:{commit}")]
    NotFound { name: String, commit: String },

    /// Fetched content did not hash to the pinned digest.
    #[error(transparent)]
    DigestMismatch(#[from] DigestMismatchError),

    /// Invalid module name, commit id or pin.
    #[error("invalid reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Digest, manifest, blob or bucket failure.
    #[error(transparent)]
    Cas(#[from] CasError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Lock file error.
    #[error("lock file error: {message}")]
    Lockfile { message: String },
}

impl RegistryError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Not found / config issues
            Self::NotFound { .. } => 1,
            Self::Config { .. } => 1,
            Self::InvalidReference { .. } => 1,

            // Security issues
            Self::DigestMismatch(_) => 4,
            Self::Cas(CasError::ContentMismatch { .. } | CasError::BlobCollision { .. }) => 4,

            // Cancelled by the caller
            Self::Cas(CasError::Cancelled) => 130,

            // Other
            Self::Cas(_) => 6,
            Self::Lockfile { .. } => 7,
        }
    }

    /// Whether the error is retryable. Integrity failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cas(CasError::Io(_) | CasError::ObjectStore(_))
        )
    }

    /// Whether this is a "does not exist" condition a caller may fall back from.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Cas(err) => err.is_not_found(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cas(CasError::Cancelled))
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Cas(CasError::Io(err))
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
