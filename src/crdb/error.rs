//! CRDB decode errors

use thiserror::Error;

/// Errors raised while decoding a query response
#[derive(Error, Debug)]
pub enum CrdbError {
    /// The service reported a request-level failure
    #[error("Service error: {0}")]
    Upstream(String),

    /// The response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The response was not valid JSON for a CRDB payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for decode operations
pub type CrdbResult<T> = Result<T, CrdbError>;
