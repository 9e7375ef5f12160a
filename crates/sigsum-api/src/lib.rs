//! Log-API abstraction for the sigsum transparency log.
//!
//! Per the teacher's "interface polymorphism over concrete clients" shape
//! (`crates/client/src/api.rs`'s `Client`), [`LogApi`] names the five
//! operations a log exposes as a trait rather than a concrete HTTP type,
//! so `sigsum-submit`, `sigsum-monitor`, and tests can all speak to it
//! without depending on `reqwest`. [`HttpLogApi`] is the one real
//! implementation shipped here.

mod add_tree_head;
mod error;
mod http;
mod outcome;

pub use add_tree_head::{AddTreeHeadAsciiError, WitnessAddTreeHead};
pub use error::ApiError;
pub use http::HttpLogApi;
pub use outcome::Outcome;

use async_trait::async_trait;

use sigsum_crypto::Hash;
use sigsum_merkle::{ConsistencyProof, InclusionProof};
use sigsum_proto::{CosignedTreeHead, Leaf, LeafRequest};

/// The operations a sigsum log exposes, independent of transport.
/// Implemented by [`HttpLogApi`] for a real log and by an in-memory
/// double in `sigsum-testing` for tests.
#[async_trait]
pub trait LogApi: Send + Sync {
    async fn get_tree_head(&self) -> Result<CosignedTreeHead, ApiError>;

    async fn get_inclusion_proof(&self, size: u64, leaf_hash: Hash) -> Result<InclusionProof, ApiError>;

    async fn get_consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof, ApiError>;

    async fn get_leaves(&self, start: u64, end: u64) -> Result<Vec<Leaf>, ApiError>;

    async fn add_leaf(&self, request: &LeafRequest, token: Option<(&str, &str)>) -> Result<Outcome, ApiError>;
}

/// The witness side of the protocol: a single `add-tree-head` call,
/// separate from [`LogApi`] because it is consumed by a witness, not by a
/// log client.
#[async_trait]
pub trait WitnessApi: Send + Sync {
    async fn add_tree_head(&self, request: &WitnessAddTreeHead) -> Result<sigsum_proto::Cosignature, ApiError>;
}
