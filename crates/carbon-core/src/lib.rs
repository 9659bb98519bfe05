//! # carbon-core
//!
//! Shared data model and error kinds for the carbon metrics daemon.
//!
//! ## Architecture
//!
//! ```text
//! carbon-core/
//! ├── metric/   # DataPoint and Metric wire types
//! ├── parser/   # plaintext line protocol parsing
//! ├── error/    # shared error kinds (ParseError, CoreError::Closed)
//! └── metrics/  # DaemonMetrics counters, shared by carbon-storage and carbon-ingest
//! ```
//!
//! This crate has no async runtime dependency of its own — it is imported
//! by `carbon-ingest`, `carbon-cache`, and `carbon-storage` for the types
//! that cross their boundaries. `DaemonMetrics` lives here rather than in
//! `carbon-cache` specifically so `carbon-storage`, which sits below
//! `carbon-cache` in the dependency graph, can update its own counters
//! without introducing a cycle.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod metric;
pub mod metrics;
pub mod parser;

pub use error::{CoreError, ParseError, Result};
pub use metric::{DataPoint, Metric};
pub use metrics::{DaemonMetrics, MetricsSnapshot};
pub use parser::parse_line;

/// Default TCP listen port for the plaintext ingestion protocol.
pub const DEFAULT_PORT: u16 = 2003;

/// Default `HandlePool` capacity (maximum open file handles at once).
pub const DEFAULT_HANDLE_POOL_CAPACITY: usize = 50;

/// Default `MetricCache` command queue capacity.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 16;

/// Upper bound on the drainer's exponential-style backoff, in milliseconds.
pub const DRAINER_BACKOFF_CAP_MS: u64 = 100_000;

/// Default maximum accepted line length, in bytes, for the TCP line
/// ingestor. Lines longer than this are rejected as `ParseError::LineTooLong`
/// without ever being buffered in full.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;
