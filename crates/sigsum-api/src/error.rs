use thiserror::Error;

/// Failure modes of a [`crate::LogApi`]/[`crate::WitnessApi`] call.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to send request: {0}")]
    Communication(#[from] reqwest::Error),
    #[error("not found (404)")]
    NotFound,
    #[error("bad request (400): {0}")]
    BadRequest(String),
    #[error("submission rejected (403): {0}")]
    Forbidden(String),
    #[error("rate limited (429)")]
    RateLimited,
    #[error("conflicting tree size: witness has {current_size}")]
    Conflict { current_size: u64 },
    #[error("consistency proof does not verify (422): {0}")]
    UnprocessableEntity(String),
    #[error("unexpected response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("malformed response body")]
    Malformed,
}
