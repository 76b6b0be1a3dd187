//! Fixed-interval task runner.

use super::Shutdown;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Call `tick`, then sleep `interval`, until `shutdown` fires.
///
/// An in-flight tick is dropped at its next await point once shutdown is
/// requested.
pub async fn run_periodic<F, Fut>(name: &str, interval: Duration, shutdown: &Shutdown, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(task = name, interval_ms = interval.as_millis() as u64, "{} is starting", name);

    while !shutdown.is_triggered() {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tick() => {}
        }

        if !shutdown.sleep(interval).await {
            break;
        }
    }

    info!(task = name, "{} is stopping", name);
}
