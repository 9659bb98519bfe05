//! Archive-level error kinds.

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Failures opening, creating, or writing to a round-robin archive file.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The retention definition string could not be parsed.
    #[error("invalid retention definition {0:?}")]
    InvalidRetention(String),

    /// The aggregation method name is not one of the four supported kinds.
    #[error("invalid aggregation method {0:?}")]
    InvalidAggregationMethod(String),

    /// x-files-factor was outside `[0.0, 1.0]`.
    #[error("x-files-factor {0} out of range [0.0, 1.0]")]
    InvalidXFilesFactor(f32),

    /// The file existed but its header did not match the expected format.
    #[error("corrupt archive header in {path}")]
    CorruptHeader {
        /// Path to the offending file.
        path: std::path::PathBuf,
    },

    /// Underlying filesystem operation failed.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}
