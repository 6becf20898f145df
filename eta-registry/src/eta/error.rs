//! ETA dispatcher error types.

use crate::domain::Operator;

/// Errors from upstream ETA calls.
///
/// Everything except [`EtaError::NoAdapter`] is folded into a
/// connection-error result at the dispatcher boundary; `NoAdapter` is a
/// programming error (querying an operator the registry was not built
/// with) and surfaces as an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum EtaError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream call timed out")]
    Timeout,

    #[error("no adapter registered for operator {0}")]
    NoAdapter(Operator),
}
