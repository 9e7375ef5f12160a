//! In-memory append-only Merkle tree, owned exclusively by whichever
//! component holds it (a log's own store, or an in-process test double).

use std::collections::HashMap;

use sigsum_crypto::Hash;

use crate::hashing::empty_tree_root;
use crate::range::{extend_compact_range, fold_compact_range};

/// An append-only Merkle tree over 32-byte leaf hashes.
///
/// Leaves are never removed. Duplicate leaf hashes are rejected by
/// [`Tree::add_leaf_hash`] rather than silently deduplicated, since the
/// first occurrence's index is what callers rely on.
#[derive(Debug, Default)]
pub struct Tree {
    leaves: Vec<Hash>,
    leaf_index: HashMap<Hash, u64>,
    compact_range: Vec<Hash>,
}

impl Tree {
    /// A new, empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `h` if it hasn't been seen before. Returns `true` if it was
    /// added, `false` if it was already present (the tree is unchanged).
    pub fn add_leaf_hash(&mut self, h: Hash) -> bool {
        if self.leaf_index.contains_key(&h) {
            return false;
        }
        let size_before = self.leaves.len() as u64;
        extend_compact_range(&mut self.compact_range, size_before, h);
        self.leaf_index.insert(h, size_before);
        self.leaves.push(h);
        true
    }

    /// Number of leaves in the tree.
    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Current root hash, `SHA256("")` for the empty tree.
    pub fn root_hash(&self) -> Hash {
        fold_compact_range(&self.compact_range)
    }

    /// Index of the first occurrence of `h`, if present.
    pub fn get_leaf_index(&self, h: &Hash) -> Option<u64> {
        self.leaf_index.get(h).copied()
    }

    /// Leaf hashes in append order, as stored so far. Used by proof
    /// generation to recompute historical subtree roots.
    pub(crate) fn leaves(&self) -> &[Hash] {
        &self.leaves
    }

    /// Entries of the current compact range, most-significant first. Used
    /// to opportunistically reuse precomputed subtree roots when a proof
    /// is requested at the current tree size.
    pub(crate) fn compact_range(&self) -> &[Hash] {
        &self.compact_range
    }
}
