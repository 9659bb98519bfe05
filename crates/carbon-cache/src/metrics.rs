//! `tracing`-backed reporting for `carbon_core::DaemonMetrics`.
//!
//! The counters themselves live in `carbon-core` (so `carbon-storage` can
//! update them without depending on this crate); this module owns the one
//! thing `carbon-core` deliberately has no dependency for: turning a
//! snapshot into a log line.

pub use carbon_core::{DaemonMetrics, MetricsSnapshot};

/// Emit one `tracing::info!` line summarizing every counter. Intended to be
/// called on a fixed interval from the daemon's main loop.
pub fn report(metrics: &DaemonMetrics) {
    let snapshot = metrics.snapshot();
    tracing::info!(
        uptime_secs = snapshot.uptime_secs,
        points_stored = snapshot.points_stored,
        points_dropped_parse = snapshot.points_dropped_parse,
        points_dropped_resolver = snapshot.points_dropped_resolver,
        batches_written = snapshot.batches_written,
        handle_pool_evictions = snapshot.handle_pool_evictions,
        handles_open = snapshot.handles_open,
        connections_active = snapshot.connections_active,
        connections_total = snapshot.connections_total,
        "daemon metrics report"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_does_not_panic_on_a_fresh_counter_set() {
        let metrics = DaemonMetrics::new();
        report(&metrics);
    }
}
