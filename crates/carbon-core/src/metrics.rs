//! Process-lifetime counters for the ingestion pipeline, exposed via
//! periodic `tracing` log lines rather than an external metrics exporter.
//!
//! Lives in `carbon-core` rather than alongside the cache/drainer so that
//! `carbon-storage` (which sits below `carbon-cache` in the dependency
//! graph) can update its own counters directly instead of going through a
//! trait object or a second, storage-local counter set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters shared across the ingestor, cache, drainer, and
/// writer. Cheap to update from many tasks concurrently.
#[derive(Debug)]
pub struct DaemonMetrics {
    /// Points successfully handed to `MetricCache::store`.
    pub points_stored: AtomicU64,
    /// Points dropped before reaching the cache (line parse failures).
    pub points_dropped_parse: AtomicU64,
    /// Points dropped because the resolver rejected the key or the archive
    /// file could not be created or opened.
    pub points_dropped_resolver: AtomicU64,
    /// Batches successfully handed to a per-key worker.
    pub batches_written: AtomicU64,
    /// Handle pool entries evicted (LRU overflow or shutdown drain).
    pub handle_pool_evictions: AtomicU64,
    /// Currently open handle pool entries.
    pub handles_open: AtomicU64,
    /// TCP connections accepted since start.
    pub connections_total: AtomicU64,
    /// TCP connections currently open.
    pub connections_active: AtomicU64,

    start_time: Instant,
}

impl DaemonMetrics {
    /// Build a fresh, all-zero counter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            points_stored: AtomicU64::new(0),
            points_dropped_parse: AtomicU64::new(0),
            points_dropped_resolver: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            handle_pool_evictions: AtomicU64::new(0),
            handles_open: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Time since this counter set was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Emit one `tracing::info!` line summarizing all counters. Intended to
    /// be called on a fixed interval from the daemon's main loop.
    ///
    /// `carbon-core` has no `tracing` dependency of its own (it is a pure
    /// data/parsing crate), so the actual log line is emitted by the caller;
    /// this just assembles the values into a ready-to-log tuple.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            points_stored: self.points_stored.load(Ordering::Relaxed),
            points_dropped_parse: self.points_dropped_parse.load(Ordering::Relaxed),
            points_dropped_resolver: self.points_dropped_resolver.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            handle_pool_evictions: self.handle_pool_evictions.load(Ordering::Relaxed),
            handles_open: self.handles_open.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for DaemonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time read of every [`DaemonMetrics`] counter, suitable for
/// logging or serializing.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Seconds since the counter set was created.
    pub uptime_secs: u64,
    /// See [`DaemonMetrics::points_stored`].
    pub points_stored: u64,
    /// See [`DaemonMetrics::points_dropped_parse`].
    pub points_dropped_parse: u64,
    /// See [`DaemonMetrics::points_dropped_resolver`].
    pub points_dropped_resolver: u64,
    /// See [`DaemonMetrics::batches_written`].
    pub batches_written: u64,
    /// See [`DaemonMetrics::handle_pool_evictions`].
    pub handle_pool_evictions: u64,
    /// See [`DaemonMetrics::handles_open`].
    pub handles_open: u64,
    /// See [`DaemonMetrics::connections_active`].
    pub connections_active: u64,
    /// See [`DaemonMetrics::connections_total`].
    pub connections_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = DaemonMetrics::new();
        assert_eq!(metrics.points_stored.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn increments_are_visible_across_clones_of_the_arc() {
        use std::sync::Arc;
        let metrics = Arc::new(DaemonMetrics::new());
        metrics.points_stored.fetch_add(3, Ordering::Relaxed);
        let other = Arc::clone(&metrics);
        other.points_stored.fetch_add(2, Ordering::Relaxed);
        assert_eq!(metrics.points_stored.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn snapshot_reflects_current_counter_values() {
        let metrics = DaemonMetrics::new();
        metrics.batches_written.fetch_add(7, Ordering::Relaxed);
        metrics.handle_pool_evictions.fetch_add(2, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_written, 7);
        assert_eq!(snapshot.handle_pool_evictions, 2);
    }
}
