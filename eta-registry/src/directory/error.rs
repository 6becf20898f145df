//! Directory error types.

use crate::storage::StorageError;

/// Errors from loading, validating, or serving the directory dataset.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned an error status code
    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Payload failed to deserialize
    #[error("malformed data sheet: {0}")]
    Malformed(String),

    /// Payload deserialized but violates referential integrity
    #[error("data sheet invariant violated: {0}")]
    Invariant(String),

    /// Durable storage failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote unreachable and no cached dataset to fall back to
    #[error("remote unreachable and no cached dataset")]
    Offline,

    /// The initial load has failed; an explicit reload is required
    #[error("no dataset available: initial load failed")]
    Unavailable,

    /// Bounded wait for the first load expired
    #[error("timed out waiting for the initial dataset load")]
    LoadTimeout,
}
