//! Fixed-backoff retry shared by every network-facing loop.

use super::Shutdown;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Returned when shutdown interrupts an operation or its backoff.
///
/// This is a clean-exit marker, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled by shutdown")]
pub struct Cancelled;

/// Successful outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    /// Number of failed attempts before the one that succeeded.
    pub retries: u32,
}

/// Run `op` until it succeeds, waiting `backoff` between failed attempts.
///
/// Each failure is logged with its attempt number. Both the operation and the
/// wait race `shutdown`; cancellation is returned as `Err(Cancelled)` and is
/// never logged as an error.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    backoff: Duration,
    shutdown: &Shutdown,
    mut op: F,
) -> Result<Retried<T>, Cancelled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut retries = 0u32;

    loop {
        if shutdown.is_triggered() {
            return Err(Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(Cancelled),
            outcome = op() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(Retried { value, retries }),
            Err(e) => {
                retries += 1;
                error!(
                    operation = label,
                    attempt = retries,
                    retry_in_secs = backoff.as_secs_f64(),
                    error = %format!("{e:#}"),
                    "{} failed, retrying in {:?}",
                    label,
                    backoff
                );
                if !shutdown.sleep(backoff).await {
                    return Err(Cancelled);
                }
            }
        }
    }
}
