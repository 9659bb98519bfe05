//! `CacheDrainer`: the periodic "bolt" that moves data points from the
//! `MetricCache` to the `StorageWriter`, backing off when there is nothing
//! to do.

use std::time::Duration;

use carbon_core::DRAINER_BACKOFF_CAP_MS;
use carbon_storage::StorageWriter;
use tokio::task::JoinHandle;

use crate::cache::MetricCache;
use crate::lifecycle::ShutdownSignal;

/// Spawn the drainer loop. It stops when `shutdown` fires; the caller is
/// responsible for stopping the drainer before closing the writer, so that
/// the drainer never attempts to `send` into a writer that has already
/// closed its inbox.
#[must_use]
pub fn spawn(cache: MetricCache, writer: StorageWriter, shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(run(cache, writer, shutdown))
}

async fn run(cache: MetricCache, writer: StorageWriter, mut shutdown: ShutdownSignal) {
    let mut backoff: u64 = 1;

    loop {
        let counts = match cache.counts().await {
            Ok(counts) => counts,
            Err(_) => break,
        };

        if counts.is_empty() {
            let delay_ms = backoff.saturating_pow(5).min(DRAINER_BACKOFF_CAP_MS);
            tracing::debug!(delay_ms, "drainer idle, backing off");
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
            backoff += 1;
            continue;
        }

        backoff = 1;
        for key in counts.keys() {
            let points = match cache.pop(key).await {
                Ok(points) => points,
                Err(_) => return,
            };
            if points.is_empty() {
                continue;
            }
            if let Err(e) = writer.send(key.clone(), points).await {
                tracing::warn!(%key, error = %e, "drainer failed to hand batch to storage writer");
            }
        }

        if shutdown.try_recv().is_ok() {
            break;
        }
    }
}
