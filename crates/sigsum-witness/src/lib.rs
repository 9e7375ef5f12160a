//! Witness state machine: cosigns a log's proposed tree head against the
//! witness's own last-seen state, persisting the result atomically.
//!
//! Grounded on `crates/client-storage/src/storage.rs` for the durable
//! write path and on `crates/server/src/services/transparency/sign.rs`
//! for the single-writer, lock-held-through-commit shape. One
//! [`WitnessState`] cosigns for exactly one log; a witness serving
//! several logs runs one instance per log key-hash.

mod error;
mod state;

pub use error::WitnessError;
pub use state::WitnessState;
