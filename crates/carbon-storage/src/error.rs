//! Error kinds for the resolver, handle pool, and storage writer.

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failures that can occur while resolving, opening, or writing to a
/// per-key archive file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No rule in either resolver config file matched the key.
    #[error("no storage rule matches key {key:?}")]
    ResolverNotFound {
        /// The key that failed to resolve.
        key: String,
    },

    /// The resolver rule file itself was malformed.
    #[error("invalid resolver config: {0}")]
    InvalidConfig(String),

    /// The writer (or the cache feeding it) has been closed.
    #[error("operation attempted on a closed storage writer")]
    Closed,
}
