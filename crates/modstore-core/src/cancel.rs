//! Cancellation for I/O-performing operations.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{CasError, CasResult};

/// Run `fut` unless `cancel` fires first.
///
/// An already-cancelled token short-circuits before `fut` is polled, so no
/// I/O is started. When the token fires mid-flight the future is dropped.
pub async fn run_cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<CasError>,
{
    if cancel.is_cancelled() {
        return Err(CasError::Cancelled.into());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CasError::Cancelled.into()),
        result = fut => result,
    }
}

/// Fail fast if `cancel` has fired.
pub fn check_cancelled(cancel: &CancellationToken) -> CasResult<()> {
    if cancel.is_cancelled() {
        Err(CasError::Cancelled)
    } else {
        Ok(())
    }
}
