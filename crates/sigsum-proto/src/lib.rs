//! Wire types for the sigsum transparency log: tree heads, leaves, proof
//! objects, and the policy used to verify them, plus the ASCII codec
//! spec.md §6 defines for all of them.

mod ascii;
pub mod leaf;
pub mod policy;
pub mod proof;
pub mod tree_head;

pub use leaf::{
    leaves_from_ascii, leaves_to_ascii, sign_leaf_message, verify_leaf_checksum, verify_leaf_message,
    InvalidLeafSignature, Leaf, LeafRequest, LeafRequestAsciiError, LeavesAsciiError, LEAF_NAMESPACE,
};
pub use policy::{Policy, PolicyError};
pub use proof::{
    consistency_proof_from_ascii, inclusion_proof_from_ascii, inclusion_proof_to_ascii_standalone,
    sigsum_proof_origin, LeafProof, ProofAsciiError, ProofError, SigsumProof,
};
pub use tree_head::{origin, Cosignature, CosignedTreeHead, SignedTreeHead, TreeHead, TreeHeadError};
