use std::time::Duration;

/// Retry, timeout, and batching parameters for [`crate::SubmitEngine`].
#[derive(Debug, Clone, Copy)]
pub struct SubmitConfig {
    /// Bounds how long one worker keeps retrying a leaf before failover.
    pub per_log_timeout: Duration,
    /// Bounds the whole batch across all workers.
    pub timeout: Duration,
    /// Delay between `add-leaf`/`get-tree-head` polls while waiting for
    /// a leaf to become persisted and included.
    pub poll_delay: Duration,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            per_log_timeout: Duration::from_secs(60),
            timeout: Duration::from_secs(600),
            poll_delay: Duration::from_secs(2),
        }
    }
}
