//! The wire-level data model: a single sample at a point in time, addressed
//! by a dot-separated key.

/// A numeric value at a point in time.
///
/// Immutable once created. Two `DataPoint`s with the same value and
/// timestamp are indistinguishable and neither ordering nor deduplication is
/// implied — `MetricCache` preserves insertion order but does not collapse
/// duplicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    /// Sample value.
    pub value: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl DataPoint {
    /// Build a data point.
    #[must_use]
    pub const fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// A parsed wire record: a key and the sample it carries.
///
/// Produced once by the line parser and consumed once by
/// `MetricCache::store`.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Dot-separated identifier, e.g. `machine.cpu.user`. Non-empty, no
    /// whitespace.
    pub key: String,
    /// The sample itself.
    pub point: DataPoint,
}

impl Metric {
    /// Build a metric record.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            point: DataPoint::new(value, timestamp),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Metric{{key: {}, value: {}, timestamp: {}}}",
            self.key, self.point.value, self.point.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_display_matches_fields() {
        let metric = Metric::new("foo.bar", 42.0, 100);
        assert_eq!(
            metric.to_string(),
            "Metric{key: foo.bar, value: 42, timestamp: 100}"
        );
    }
}
