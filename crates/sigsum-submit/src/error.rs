use thiserror::Error;

use sigsum_api::ApiError;
use sigsum_merkle::MerkleError;
use sigsum_proto::PolicyError;

/// Failure modes of submitting one leaf through [`crate::SubmitEngine`].
#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    #[error("leaf request signature does not verify under the submitter's own public key")]
    InvalidLeafSignature,
    #[error("log rejected the leaf: {0}")]
    Forbidden(String),
    #[error("log is rate-limiting add-leaf")]
    RateLimited,
    #[error("cosigned tree head does not satisfy the policy: {0}")]
    PolicyNotSatisfied(#[source] PolicyError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error("log communication failure: {0}")]
    Communication(String),
    #[error("per-log timeout elapsed before the leaf was proven included")]
    Timeout,
    #[error("batch timeout elapsed")]
    BatchTimeout,
    #[error("submission was cancelled")]
    Cancelled,
    #[error("no configured log accepted the leaf")]
    AllLogsFailed,
}

impl From<ApiError> for SubmitError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Forbidden(msg) => SubmitError::Forbidden(msg),
            ApiError::RateLimited => SubmitError::RateLimited,
            other => SubmitError::Communication(other.to_string()),
        }
    }
}
