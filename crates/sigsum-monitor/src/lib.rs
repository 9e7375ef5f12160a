//! Monitor: a per-log tailing loop that refreshes a log's tree head,
//! verifies it's a consistent extension of what's already seen, fetches
//! new leaves in pages, proves them included, and re-verifies the
//! signatures of leaves submitted under keys it's watching.

mod callbacks;
mod config;
mod engine;
mod error;
mod state;

pub use callbacks::MonitorCallbacks;
pub use config::MonitorConfig;
pub use engine::MonitorLoop;
pub use error::{Alert, MonitorError};
pub use state::ResumeState;
