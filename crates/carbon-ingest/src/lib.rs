//! # carbon-ingest
//!
//! The TCP line ingestor: accepts connections, reads newline-terminated
//! Graphite plaintext records, parses them with `carbon_core::parse_line`,
//! and hands the result to a `carbon_cache::MetricCache`.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod tcp;

pub use tcp::run;
