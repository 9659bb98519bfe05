//! # carbon-storage
//!
//! Everything between "the cache drained a batch for this key" and "the
//! bytes are on disk": a regex-driven [`resolver::StorageResolver`], a
//! capacity-bounded [`handle_pool::HandlePool`] of open archive files with
//! flush-on-evict, and a [`writer::StorageWriter`] that serializes writes
//! per key while running distinct keys in parallel.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

mod handle_pool;
pub mod error;
pub mod ini;
pub mod resolver;
pub mod writer;

pub use error::{Result, StorageError};
pub use resolver::{StoragePolicy, StorageResolver};
pub use writer::{StorageWriter, WriteMode};
