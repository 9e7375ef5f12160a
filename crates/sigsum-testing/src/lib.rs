//! Shared test fixtures: deterministic keys and messages, and an
//! in-memory [`LogApi`] double standing in for a real log server.
//!
//! Grounded on the teacher's `tests/support/mod.rs`-style shared test
//! helper crate (key constants plus a spawned-server stand-in), adapted
//! here to an in-process double since no log server is implemented in
//! this workspace.

use std::sync::Mutex;

use async_trait::async_trait;

use sigsum_api::{ApiError, LogApi, Outcome};
use sigsum_crypto::{Hash, PrivateKey, PublicKey};
use sigsum_merkle::{prove_consistency, prove_inclusion, ConsistencyProof, InclusionProof, Tree};
use sigsum_proto::{origin, CosignedTreeHead, Leaf, LeafRequest, SignedTreeHead};

/// A deterministic signing key for test index `seed`. Never use outside
/// tests: the "randomness" is just the seed byte repeated.
pub fn deterministic_key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32]).expect("32 constant bytes are a valid Ed25519 seed")
}

/// `SHA256("leaf" || i_be32)`, the message convention spec scenarios use.
pub fn test_message(i: u32) -> Hash {
    let mut buf = Vec::with_capacity(8);
    buf.extend_from_slice(b"leaf");
    buf.extend_from_slice(&i.to_be_bytes());
    Hash::sha256(&buf)
}

struct Inner {
    tree: Tree,
    leaves: Vec<Leaf>,
    refuse_after: Option<usize>,
}

/// An in-memory log: accepts leaves up to an optional cutoff (to
/// simulate a log that starts refusing submissions, per scenario S6),
/// appends them to a real [`Tree`], and serves tree-head/inclusion/
/// consistency/leaves queries against it.
pub struct InMemoryLog {
    log_key: PrivateKey,
    inner: Mutex<Inner>,
}

impl InMemoryLog {
    pub fn new(log_key: PrivateKey) -> Self {
        Self {
            log_key,
            inner: Mutex::new(Inner {
                tree: Tree::new(),
                leaves: Vec::new(),
                refuse_after: None,
            }),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.log_key.public_key()
    }

    pub fn key_hash(&self) -> Hash {
        self.log_key.public_key().key_hash()
    }

    /// After this many accepted leaves, `add_leaf` starts returning
    /// `Forbidden` instead of persisting further submissions.
    pub fn refuse_after(&self, count: usize) {
        self.inner.lock().unwrap().refuse_after = Some(count);
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().tree.size()
    }

    /// Sign the current tree state, for direct use against a witness
    /// without going through [`LogApi`].
    pub fn signed_tree_head(&self) -> SignedTreeHead {
        let inner = self.inner.lock().unwrap();
        let tree_head = sigsum_proto::tree_head::TreeHead {
            size: inner.tree.size(),
            root_hash: inner.tree.root_hash(),
        };
        SignedTreeHead::sign(tree_head, &origin(&self.key_hash()), &self.log_key)
    }

    pub fn consistency_proof(&self, old_size: u64, new_size: u64) -> ConsistencyProof {
        let inner = self.inner.lock().unwrap();
        prove_consistency(&inner.tree, old_size, new_size).expect("valid size range")
    }
}

#[async_trait]
impl LogApi for InMemoryLog {
    async fn get_tree_head(&self) -> Result<CosignedTreeHead, ApiError> {
        Ok(CosignedTreeHead::new(self.signed_tree_head()))
    }

    async fn get_inclusion_proof(&self, size: u64, leaf_hash: Hash) -> Result<InclusionProof, ApiError> {
        let inner = self.inner.lock().unwrap();
        let index = inner.tree.get_leaf_index(&leaf_hash).ok_or(ApiError::NotFound)?;
        prove_inclusion(&inner.tree, index, size).map_err(|_| ApiError::NotFound)
    }

    async fn get_consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof, ApiError> {
        let inner = self.inner.lock().unwrap();
        prove_consistency(&inner.tree, old_size, new_size).map_err(|_| ApiError::NotFound)
    }

    async fn get_leaves(&self, start: u64, end: u64) -> Result<Vec<Leaf>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let start = start as usize;
        let end = (end as usize).min(inner.leaves.len());
        Ok(inner.leaves[start..end].to_vec())
    }

    async fn add_leaf(&self, request: &LeafRequest, _token: Option<(&str, &str)>) -> Result<Outcome, ApiError> {
        let leaf = request.verify().map_err(|_| ApiError::Forbidden("bad leaf signature".into()))?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(limit) = inner.refuse_after {
            if inner.leaves.len() >= limit {
                return Err(ApiError::Forbidden("log is no longer accepting submissions".into()));
            }
        }
        inner.tree.add_leaf_hash(leaf.leaf_hash());
        inner.leaves.push(leaf);
        Ok(Outcome::Persisted)
    }
}
