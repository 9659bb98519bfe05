//! # carbon-cache
//!
//! The in-process middle of the pipeline: [`cache::MetricCache`] accepts
//! points from many producers without blocking, [`drainer`] periodically
//! moves them to a `carbon_storage::StorageWriter`, and [`lifecycle`] plus
//! [`config`] carry the daemon's startup/shutdown/config ambient stack.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod drainer;
pub mod error;
pub mod lifecycle;
pub mod metrics;

pub use cache::MetricCache;
pub use config::{DaemonConfig, WriteModeConfig};
pub use error::{CacheError, Result};
pub use lifecycle::{DaemonLifecycle, DaemonState, ShutdownSignal};
pub use metrics::{report as report_metrics, DaemonMetrics};
