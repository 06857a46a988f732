//! Tamper-proofing for fetched module and plugin content.
//!
//! A [`VerifiedPayload`] pairs a [`CommitKey`] with a lazy fetch. The first
//! successful fetch is digested and compared with the key's digest; the
//! outcome, good or bad, is kept for the lifetime of the payload. Concurrent
//! callers wait on the same fetch.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use modstore_core::{run_cancellable, Digest, Digester};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::data::CommitKey;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::{CommitId, FullName};

/// What a payload holds, for messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Module,
    Plugin,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetched content did not match the digest it was pinned to.
///
/// Match on the fields rather than on the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMismatchError {
    pub kind: DataKind,
    pub full_name: FullName,
    pub commit_id: CommitId,
    pub expected: Digest,
    pub actual: Digest,
}

impl fmt::Display for DigestMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "*** Digest verification failed for {} {}:{} ***",
            self.kind, self.full_name, self.commit_id
        )?;
        writeln!(f, "\tExpected digest: {}", self.expected)?;
        writeln!(f, "\tActual digest:   {}", self.actual)?;
        writeln!(
            f,
            "\tThis may be the result of a hand-edited or corrupted lock file, a corrupted local cache, or an attack."
        )?;
        write!(
            f,
            "\tTo recover, clear your local cache directory and fetch again."
        )
    }
}

impl std::error::Error for DigestMismatchError {}

/// Boxed future returned by a payload's fetch function.
pub type FetchFuture = BoxFuture<'static, RegistryResult<Bytes>>;

type FetchFn = dyn Fn() -> FetchFuture + Send + Sync;

/// Content behind a key, verified against the key's digest on first access.
pub struct VerifiedPayload {
    kind: DataKind,
    key: CommitKey,
    fetch: Box<FetchFn>,
    outcome: OnceCell<Result<Bytes, DigestMismatchError>>,
}

impl VerifiedPayload {
    /// Wrap a fetch function. Nothing is fetched until [`Self::data`].
    pub fn new<F, Fut>(kind: DataKind, key: CommitKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RegistryResult<Bytes>> + Send + 'static,
    {
        Self {
            kind,
            key,
            fetch: Box::new(move || fetch().boxed()),
            outcome: OnceCell::new(),
        }
    }

    /// Wrap content that is already in memory.
    pub fn from_bytes(kind: DataKind, key: CommitKey, content: Bytes) -> Self {
        Self::new(kind, key, move || {
            let content = content.clone();
            async move { Ok::<_, RegistryError>(content) }
        })
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn key(&self) -> &CommitKey {
        &self.key
    }

    /// Verified content.
    ///
    /// A digest mismatch is returned on this and every later call. A fetch
    /// error is returned as is and not remembered; cancellation leaves the
    /// payload untouched.
    pub async fn data(&self, cancel: &CancellationToken) -> RegistryResult<Bytes> {
        let outcome = run_cancellable(
            cancel,
            self.outcome.get_or_try_init(|| self.fetch_and_verify()),
        )
        .await?;
        outcome.clone().map_err(RegistryError::from)
    }

    /// `Some(true)` once verified, `Some(false)` once rejected.
    pub fn is_verified(&self) -> Option<bool> {
        self.outcome.get().map(Result::is_ok)
    }

    async fn fetch_and_verify(&self) -> RegistryResult<Result<Bytes, DigestMismatchError>> {
        let content = (self.fetch)().await?;
        let expected = &self.key.digest;
        let actual = Digester::new(expected.digest_type()).digest_bytes(&content);

        if &actual == expected {
            debug!(
                kind = %self.kind,
                key = %self.key,
                size = content.len(),
                "verified payload digest"
            );
            return Ok(Ok(content));
        }

        warn!(
            kind = %self.kind,
            key = %self.key,
            expected = %expected,
            actual = %actual,
            "payload digest mismatch"
        );
        Ok(Err(DigestMismatchError {
            kind: self.kind,
            full_name: self.key.full_name.clone(),
            commit_id: self.key.commit_id,
            expected: expected.clone(),
            actual,
        }))
    }
}

impl fmt::Debug for VerifiedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedPayload")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("verified", &self.is_verified())
            .finish()
    }
}
