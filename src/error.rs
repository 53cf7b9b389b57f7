//! Error types for the gridcast library.

use thiserror::Error;

/// Result type for gridcast operations.
pub type Result<T> = std::result::Result<T, GridError>;

/// Error types for service operations.
///
/// Checkpoint/architecture mismatches are deliberately absent: restore
/// recovers from them locally by falling back to fresh initialization and
/// never surfaces them to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GridError {
    /// A caller-supplied document could not be parsed into a feature
    /// sequence. Non-fatal; reported back without partial processing.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Tensor-level failure inside the model. Fatal for the current request.
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    /// Filesystem failure at the persistence boundary.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
