use thiserror::Error;

/// Failure modes of [`crate::WitnessState::add_tree_head`] and startup.
#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("key_hash does not match the configured log")]
    NotFound,
    #[error("log signature on proposed tree head is invalid")]
    Forbidden,
    #[error("tree size conflict: witness's current size is {current_size}")]
    Conflict { current_size: u64 },
    #[error("consistency proof from current size to proposed size does not verify")]
    UnprocessableEntity,
    #[error("failed to read or write persisted state: {0}")]
    Io(#[from] std::io::Error),
    #[error("persisted state file is invalid: {0}")]
    InvalidPersistedState(String),
}
