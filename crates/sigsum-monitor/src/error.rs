use thiserror::Error;

use sigsum_crypto::Hash;

/// Non-fatal conditions raised during one tailing pass; delivered via
/// [`crate::MonitorCallbacks::alert`] and never stop the loop.
#[derive(Error, Debug, Clone)]
pub enum Alert {
    #[error("log communication failure: {0}")]
    LogError(String),
    #[error("log signature on tree head does not verify")]
    InvalidLogSignature,
    #[error("new tree head is not a consistent extension of the local one")]
    InconsistentTreeHead,
    #[error("leaf at key_hash {key_hash} failed signature verification and was skipped")]
    InvalidLeafSignature { key_hash: Hash },
    #[error("{0}")]
    Other(String),
}

/// Fatal failure modes, returned only from setup (opening resume state)
/// or a cancelled loop; everything else surfaces as an [`Alert`] instead.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("failed to read or write resume state: {0}")]
    Io(#[from] std::io::Error),
    #[error("resume state file is invalid: {0}")]
    InvalidResumeState(String),
    #[error("monitor loop was cancelled")]
    Cancelled,
}
