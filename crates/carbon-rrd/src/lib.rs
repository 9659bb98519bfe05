//! # carbon-rrd
//!
//! A minimal round-robin time-series archive file: fixed-size, per-retention
//! ring buffers of timestamped samples, addressed by `timestamp % num_points`.
//! `carbon-storage` depends only on
//! [`ArchiveFile::create`]/[`ArchiveFile::open`]/[`ArchiveFile::update_many`]/
//! [`ArchiveFile::fetch`]/[`ArchiveFile::close`] — everything else here is
//! implementation detail of the file format.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod archive;
pub mod error;
pub mod retention;

pub use archive::ArchiveFile;
pub use error::{ArchiveError, Result};
pub use retention::{parse_retention_defs, AggregationMethod, Retention};
