//! Error types for cache/drainer wiring and daemon-level configuration.

/// Result type for cache-crate operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Failures that can occur wiring together the cache, drainer, and storage
/// writer, or loading daemon configuration.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A core ingestion error (parse failure, closed component).
    #[error(transparent)]
    Core(#[from] carbon_core::CoreError),

    /// A storage-layer error (resolver, writer, closed component).
    #[error(transparent)]
    Storage(#[from] carbon_storage::StorageError),

    /// The daemon configuration file or CLI arguments were invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}
