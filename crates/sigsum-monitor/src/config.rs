use std::time::Duration;

/// Tailing cadence and batch size for [`crate::MonitorLoop`].
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// How long to wait between passes once a log has caught up.
    pub query_interval: Duration,
    /// Maximum leaves fetched from `get-leaves` per page.
    pub batch_size: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            query_interval: Duration::from_secs(600),
            batch_size: 512,
        }
    }
}
