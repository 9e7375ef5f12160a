//! Append-only Merkle tree over domain-separated SHA-256 leaf hashes, with
//! RFC 6962/9162 inclusion and consistency proofs.

pub mod hashing;
pub mod proof;
pub mod range;
pub mod tree;

pub use hashing::{empty_tree_root, hash_interior, hash_leaf};
pub use proof::{
    prove_consistency, prove_inclusion, verify_consistency, verify_inclusion,
    verify_inclusion_batch, verify_inclusion_tail, ConsistencyProof, InclusionProof, MerkleError,
};
pub use tree::Tree;
