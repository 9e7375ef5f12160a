//! Inclusion and consistency proofs, generation and verification, per
//! RFC 6962 §2.1 and RFC 9162 §2.1.4.

use thiserror::Error;

use sigsum_crypto::Hash;

use crate::hashing::hash_interior;
use crate::range::{compact_fold, largest_pow2_lt};
use crate::tree::Tree;

/// An audit path proving that a leaf at `leaf_index` is present in a tree
/// of some size (carried out-of-band by the caller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub path: Vec<Hash>,
}

/// Evidence that a tree at size `m` is a prefix of a tree at size `n`
/// (both sizes carried out-of-band by the caller).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyProof {
    pub path: Vec<Hash>,
}

/// Failure modes for proof generation and verification.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleError {
    /// `index >= size`, or `m > n`, or a requested size exceeds the
    /// tree's current size.
    #[error("index or size out of range")]
    OutOfRange,
    /// The proof's path length doesn't match what the formula for this
    /// `(index, size)` or `(m, n)` pair requires.
    #[error("malformed proof: unexpected path length")]
    Malformed,
    /// The path was structurally well-formed but recomputing the root
    /// from it didn't match the expected value.
    #[error("proof does not match the expected root")]
    Mismatch,
}

/// `popcount(index >> k) + k`, with `k = bit_length(index XOR (size-1))`:
/// the audit path length for `prove_inclusion(index, size)`.
fn inclusion_path_len(index: u64, size: u64) -> u32 {
    if size == 1 {
        return 0;
    }
    let k = 64 - (index ^ (size - 1)).leading_zeros();
    (index >> k).count_ones() + k
}

/// Root hash of the leaf range `[lo, hi)`, reusing the tree's compact
/// range when `hi` equals the tree's current size and `[lo, hi)` is one of
/// its perfect-subtree segments.
fn subtree_root(tree: &Tree, lo: u64, hi: u64) -> Hash {
    debug_assert!(lo < hi);
    if hi - lo == 1 {
        return tree.leaves()[lo as usize];
    }
    if hi == tree.size() {
        if let Some(h) = compact_range_lookup(tree, lo, hi) {
            return h;
        }
    }
    let k = largest_pow2_lt(hi - lo);
    let left = subtree_root(tree, lo, lo + k);
    let right = subtree_root(tree, lo + k, hi);
    hash_interior(&left, &right)
}

/// If `[lo, hi)` is exactly one of the tree's current compact-range
/// segments, return its precomputed hash.
fn compact_range_lookup(tree: &Tree, lo: u64, hi: u64) -> Option<Hash> {
    let size = tree.size();
    let mut start = 0u64;
    for (i, bit) in (0..64).rev().filter(|b| size & (1u64 << b) != 0).enumerate() {
        let len = 1u64 << bit;
        if start == lo && start + len == hi {
            return tree.compact_range().get(i).copied();
        }
        start += len;
    }
    None
}

fn prove_inclusion_range(tree: &Tree, m: u64, lo: u64, hi: u64) -> Vec<Hash> {
    if hi - lo == 1 {
        return Vec::new();
    }
    let k = largest_pow2_lt(hi - lo);
    if m - lo < k {
        let mut path = prove_inclusion_range(tree, m, lo, lo + k);
        path.push(subtree_root(tree, lo + k, hi));
        path
    } else {
        let mut path = prove_inclusion_range(tree, m, lo + k, hi);
        path.push(subtree_root(tree, lo, lo + k));
        path
    }
}

/// Generate the audit path for leaf `index` at tree size `size`, where
/// `index < size <= tree.size()`.
pub fn prove_inclusion(tree: &Tree, index: u64, size: u64) -> Result<InclusionProof, MerkleError> {
    if size == 0 || size > tree.size() || index >= size {
        return Err(MerkleError::OutOfRange);
    }
    let path = prove_inclusion_range(tree, index, 0, size);
    Ok(InclusionProof {
        leaf_index: index,
        path,
    })
}

fn verify_inclusion_range(
    leaf_hash: Hash,
    m: u64,
    lo: u64,
    hi: u64,
    path: &[Hash],
    pos: &mut usize,
) -> Result<Hash, MerkleError> {
    if hi - lo == 1 {
        return Ok(leaf_hash);
    }
    let k = largest_pow2_lt(hi - lo);
    let next = |pos: &mut usize| -> Result<Hash, MerkleError> {
        let h = *path.get(*pos).ok_or(MerkleError::Malformed)?;
        *pos += 1;
        Ok(h)
    };
    if m - lo < k {
        let left = verify_inclusion_range(leaf_hash, m, lo, lo + k, path, pos)?;
        let right = next(pos)?;
        Ok(hash_interior(&left, &right))
    } else {
        let right = verify_inclusion_range(leaf_hash, m, lo + k, hi, path, pos)?;
        let left = next(pos)?;
        Ok(hash_interior(&left, &right))
    }
}

/// Recompute the root from `leaf_hash`, `index`, `size`, and `path`, and
/// compare it against `root`.
pub fn verify_inclusion(
    leaf_hash: Hash,
    index: u64,
    size: u64,
    root: Hash,
    path: &[Hash],
) -> Result<(), MerkleError> {
    if size == 0 || index >= size {
        return Err(MerkleError::OutOfRange);
    }
    if inclusion_path_len(index, size) as usize != path.len() {
        return Err(MerkleError::Malformed);
    }
    let mut pos = 0;
    let computed = verify_inclusion_range(leaf_hash, index, 0, size, path, &mut pos)?;
    if pos != path.len() {
        return Err(MerkleError::Malformed);
    }
    if computed != root {
        return Err(MerkleError::Mismatch);
    }
    Ok(())
}

fn subproof(
    tree: &Tree,
    m_rel: u64,
    lo: u64,
    hi: u64,
    complete: bool,
) -> Vec<Hash> {
    let n = hi - lo;
    if m_rel == n {
        return if complete {
            Vec::new()
        } else {
            vec![subtree_root(tree, lo, hi)]
        };
    }
    let k = largest_pow2_lt(n);
    if m_rel <= k {
        let mut path = subproof(tree, m_rel, lo, lo + k, complete);
        path.push(subtree_root(tree, lo + k, hi));
        path
    } else {
        let mut path = subproof(tree, m_rel - k, lo + k, hi, false);
        path.push(subtree_root(tree, lo, lo + k));
        path
    }
}

/// Generate the consistency path between sizes `m` and `n`, where
/// `0 <= m <= n <= tree.size()`. Empty when `m == 0` or `m == n`.
pub fn prove_consistency(tree: &Tree, m: u64, n: u64) -> Result<ConsistencyProof, MerkleError> {
    if m > n || n > tree.size() {
        return Err(MerkleError::OutOfRange);
    }
    if m == 0 || m == n {
        return Ok(ConsistencyProof::default());
    }
    Ok(ConsistencyProof {
        path: subproof(tree, m, 0, n, true),
    })
}

/// Verify that `new_root` (tree size `new_size`) is a valid extension of
/// `old_root` (tree size `old_size`), per RFC 9162 §2.1.4.2.
pub fn verify_consistency(
    old_size: u64,
    new_size: u64,
    old_root: Hash,
    new_root: Hash,
    path: &[Hash],
) -> Result<(), MerkleError> {
    if old_size > new_size {
        return Err(MerkleError::OutOfRange);
    }
    if old_size == new_size {
        return if !path.is_empty() {
            Err(MerkleError::Malformed)
        } else if old_root == new_root {
            Ok(())
        } else {
            Err(MerkleError::Mismatch)
        };
    }
    if old_size == 0 {
        return if !path.is_empty() {
            Err(MerkleError::Malformed)
        } else if old_root == crate::hashing::empty_tree_root() {
            Ok(())
        } else {
            Err(MerkleError::Mismatch)
        };
    }

    let mut node = old_size - 1;
    let mut last_node = new_size - 1;
    while node & 1 == 1 {
        node >>= 1;
        last_node >>= 1;
    }

    let mut pos = 0usize;
    let mut next = |pos: &mut usize| -> Result<Hash, MerkleError> {
        let h = *path.get(*pos).ok_or(MerkleError::Malformed)?;
        *pos += 1;
        Ok(h)
    };

    let (mut old_node, mut new_node) = if node > 0 {
        let h = next(&mut pos)?;
        (h, h)
    } else {
        (old_root, old_root)
    };

    while node > 0 {
        if node & 1 == 1 {
            let sibling = next(&mut pos)?;
            old_node = hash_interior(&sibling, &old_node);
            new_node = hash_interior(&sibling, &new_node);
        } else if node < last_node {
            let sibling = next(&mut pos)?;
            new_node = hash_interior(&new_node, &sibling);
        }
        node >>= 1;
        last_node >>= 1;
    }
    while last_node > 0 {
        let sibling = next(&mut pos)?;
        new_node = hash_interior(&new_node, &sibling);
        last_node >>= 1;
    }

    if pos != path.len() {
        return Err(MerkleError::Malformed);
    }
    if old_node != old_root || new_node != new_root {
        return Err(MerkleError::Mismatch);
    }
    Ok(())
}

/// Specialisation of [`verify_inclusion_batch`] for a run that ends
/// exactly at `tree_size`: since there's nothing to the run's right, a
/// single audit path suffices. `path` is the ordinary single-leaf
/// inclusion path for `first_index` at `tree_size` (as returned by a
/// standard inclusion-proof query). Its deepest levels, the ones lying
/// inside the run itself, are redundant with `leaves` and are skipped
/// rather than consumed.
pub fn verify_inclusion_tail(
    leaves: &[Hash],
    first_index: u64,
    tree_size: u64,
    root: Hash,
    path: &[Hash],
) -> Result<(), MerkleError> {
    if leaves.is_empty() || first_index + leaves.len() as u64 != tree_size {
        return Err(MerkleError::OutOfRange);
    }
    let last_index = tree_size - 1;
    let skip = inclusion_path_len(0, leaves.len() as u64) as usize;
    let trimmed = path.get(skip..).ok_or(MerkleError::Malformed)?;

    let mut pos = 0;
    let computed = verify_anchored(leaves, first_index, last_index, first_index, 0, tree_size, trimmed, &mut pos)?;
    if pos != trimmed.len() {
        return Err(MerkleError::Malformed);
    }
    if computed != root {
        return Err(MerkleError::Mismatch);
    }
    Ok(())
}

/// Verify a contiguous, possibly-interior run `[first_index,
/// first_index+leaves.len())` using inclusion paths for its first and
/// last elements. The two paths' shared upper levels (above the run's own
/// bounding subtree) must agree; any disagreement is rejected, and the
/// run's own leaves are independently refolded rather than trusted.
pub fn verify_inclusion_batch(
    leaves: &[Hash],
    first_index: u64,
    tree_size: u64,
    root: Hash,
    start_path: &[Hash],
    end_path: &[Hash],
) -> Result<(), MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::OutOfRange);
    }
    let len = leaves.len() as u64;
    let last_index = first_index + len - 1;
    if last_index >= tree_size {
        return Err(MerkleError::OutOfRange);
    }

    verify_inclusion(leaves[0], first_index, tree_size, root, start_path)?;
    verify_inclusion(*leaves.last().unwrap(), last_index, tree_size, root, end_path)?;

    if len == 1 {
        return Ok(());
    }

    // Descend from the root to the smallest subtree bounding the whole
    // run, recording at each level whether the run stayed in the left or
    // right child. Those levels' siblings live entirely outside the run
    // and must match between start_path and end_path.
    let mut lo = 0u64;
    let mut hi = tree_size;
    let mut went_left = Vec::new();
    loop {
        if hi - lo == 1 {
            break;
        }
        let k = largest_pow2_lt(hi - lo);
        let mid = lo + k;
        if last_index < mid {
            hi = mid;
            went_left.push(true);
        } else if first_index >= mid {
            lo = mid;
            went_left.push(false);
        } else {
            break;
        }
    }
    let shared = went_left.len();

    if shared > start_path.len() || shared > end_path.len() {
        return Err(MerkleError::Malformed);
    }
    let start_tail = &start_path[start_path.len() - shared..];
    let end_tail = &end_path[end_path.len() - shared..];
    if start_tail != end_tail {
        return Err(MerkleError::Mismatch);
    }

    // Below the bounding subtree, walk down to `first_index` reusing
    // start_path and down to `last_index` reusing end_path. Either walk
    // may bottom out early, before reaching an actual leaf, once the
    // current sub-range falls entirely inside the run: at that point its
    // hash comes from independently refolding `leaves` rather than from
    // either supplied path.
    let k = largest_pow2_lt(hi - lo);
    let mid = lo + k;
    let left = verify_anchored(leaves, first_index, last_index, first_index, lo, mid, start_path, &mut 0)?;
    let right = verify_anchored(leaves, first_index, last_index, last_index, mid, hi, end_path, &mut 0)?;

    // Combine up through the shared upper siblings. `went_left` was
    // recorded root-to-straddle (top to bottom); reverse it to
    // bottom-to-top so it lines up with `start_tail`, which (like any
    // audit path) is ordered from the deepest shared level up to the root.
    let mut node = hash_interior(&left, &right);
    for (sibling, went_left) in start_tail.iter().zip(went_left.iter().rev()) {
        node = if *went_left {
            hash_interior(&node, sibling)
        } else {
            hash_interior(sibling, &node)
        };
    }
    if node != root {
        return Err(MerkleError::Mismatch);
    }
    Ok(())
}

/// Recompute the hash of `[lo, hi)`, a descendant of the run's bounding
/// subtree that contains `target` (one of the run's own endpoints).
/// Mirrors [`verify_inclusion_range`]'s recursion toward `target`, except
/// that any sub-range — whether the one being recursed into or a sibling
/// read from `path` — that turns out to lie entirely inside
/// `[first_index, last_index]` is refolded directly from `leaves` instead,
/// since the caller already holds those hashes and has no reason to trust
/// the path for them.
fn verify_anchored(
    leaves: &[Hash],
    first_index: u64,
    last_index: u64,
    target: u64,
    lo: u64,
    hi: u64,
    path: &[Hash],
    pos: &mut usize,
) -> Result<Hash, MerkleError> {
    if lo >= first_index && hi <= last_index + 1 {
        return Ok(compact_fold(&leaves[(lo - first_index) as usize..(hi - first_index) as usize]));
    }
    if hi - lo == 1 {
        return Err(MerkleError::Malformed);
    }
    let k = largest_pow2_lt(hi - lo);
    let mid = lo + k;
    let mut next_sibling = |lo: u64, hi: u64, pos: &mut usize| -> Result<Hash, MerkleError> {
        if lo >= first_index && hi <= last_index + 1 {
            Ok(compact_fold(&leaves[(lo - first_index) as usize..(hi - first_index) as usize]))
        } else {
            let h = *path.get(*pos).ok_or(MerkleError::Malformed)?;
            *pos += 1;
            Ok(h)
        }
    };
    if target - lo < k {
        let left = verify_anchored(leaves, first_index, last_index, target, lo, mid, path, pos)?;
        let right = next_sibling(mid, hi, pos)?;
        Ok(hash_interior(&left, &right))
    } else {
        let right = verify_anchored(leaves, first_index, last_index, target, mid, hi, path, pos)?;
        let left = next_sibling(lo, mid, pos)?;
        Ok(hash_interior(&left, &right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build_tree(n: u8) -> Tree {
        let mut tree = Tree::new();
        for i in 0..n {
            tree.add_leaf_hash(Hash::sha256(&[i]));
        }
        tree
    }

    #[test]
    fn single_leaf_tree_has_root_equal_to_leaf_hash() {
        let tree = build_tree(1);
        assert_eq!(tree.root_hash(), Hash::sha256(&[0]));
        let proof = prove_inclusion(&tree, 0, 1).unwrap();
        assert!(proof.path.is_empty());
        verify_inclusion(Hash::sha256(&[0]), 0, 1, tree.root_hash(), &proof.path).unwrap();
    }

    #[test]
    fn inclusion_round_trips_for_every_index_and_size() {
        let tree = build_tree(12);
        for n in 1..=tree.size() {
            let root_n = subtree_root(&tree, 0, n);
            for i in 0..n {
                let proof = prove_inclusion(&tree, i, n).unwrap();
                verify_inclusion(tree.leaves()[i as usize], i, n, root_n, &proof.path)
                    .unwrap_or_else(|e| panic!("n={n} i={i}: {e:?}"));
            }
        }
    }

    #[test]
    fn consistency_round_trips_for_every_m_and_n() {
        let tree = build_tree(12);
        for n in 1..=tree.size() {
            for m in 0..=n {
                let proof = prove_consistency(&tree, m, n).unwrap();
                let root_m = subtree_root_or_empty(&tree, m);
                let root_n = subtree_root_or_empty(&tree, n);
                verify_consistency(m, n, root_m, root_n, &proof.path)
                    .unwrap_or_else(|e| panic!("m={m} n={n}: {e:?}"));
            }
        }
    }

    fn subtree_root_or_empty(tree: &Tree, n: u64) -> Hash {
        if n == 0 {
            crate::hashing::empty_tree_root()
        } else {
            subtree_root(tree, 0, n)
        }
    }

    #[test]
    fn seven_leaf_inclusion_matches_spec_example() {
        let tree = build_tree(7);
        let h = |i: u8| Hash::sha256(&[i]);
        let h01 = hash_interior(&h(0), &h(1));
        let h45 = hash_interior(&h(4), &h(5));
        let h456 = hash_interior(&h45, &h(6));
        let proof = prove_inclusion(&tree, 3, 7).unwrap();
        assert_eq!(proof.path, vec![h(2), h01, h456]);
    }

    #[test]
    fn seven_leaf_consistency_six_to_seven_matches_spec_example() {
        let tree = build_tree(7);
        let h = |i: u8| Hash::sha256(&[i]);
        let h0123 = {
            let h01 = hash_interior(&h(0), &h(1));
            let h23 = hash_interior(&h(2), &h(3));
            hash_interior(&h01, &h23)
        };
        let h45 = hash_interior(&h(4), &h(5));
        let proof = prove_consistency(&tree, 6, 7).unwrap();
        assert_eq!(proof.path, vec![h45, h(6), h0123]);
    }

    #[test]
    fn bit_flip_in_path_fails_verification() {
        let tree = build_tree(12);
        let proof = prove_inclusion(&tree, 5, 12).unwrap();
        let mut bad_path = proof.path.clone();
        let mut bytes = *bad_path[0].as_bytes();
        bytes[0] ^= 1;
        bad_path[0] = Hash::from(bytes);
        let err = verify_inclusion(tree.leaves()[5], 5, 12, subtree_root(&tree, 0, 12), &bad_path)
            .unwrap_err();
        assert_eq!(err, MerkleError::Mismatch);
    }

    #[test]
    fn verify_inclusion_tail_matches_plain_inclusion() {
        let tree = build_tree(10);
        let root = tree.root_hash();
        let proof = prove_inclusion(&tree, 0, 10).unwrap();
        // a single-element tail run is just ordinary inclusion of the last leaf
        let last_proof = prove_inclusion(&tree, 9, 10).unwrap();
        verify_inclusion_tail(&[tree.leaves()[9]], 9, 10, root, &last_proof.path).unwrap();
        // silence unused variable warning for the full-tree proof above
        let _ = proof;
    }

    #[test]
    fn verify_inclusion_tail_rejects_run_not_ending_at_tree_size() {
        let tree = build_tree(10);
        let root = tree.root_hash();
        let proof = prove_inclusion(&tree, 4, 10).unwrap();
        let err = verify_inclusion_tail(&[tree.leaves()[4]], 4, 9, root, &proof.path).unwrap_err();
        assert_eq!(err, MerkleError::OutOfRange);
    }

    #[test]
    fn verify_inclusion_tail_accepts_multi_leaf_run_at_every_size() {
        let tree = build_tree(100);
        let root = tree.root_hash();
        for first_index in [0u64, 64, 88, 90, 96, 99] {
            let run_len = tree.size() - first_index;
            let leaves: Vec<Hash> = (first_index..tree.size()).map(|i| tree.leaves()[i as usize]).collect();
            let proof = prove_inclusion(&tree, first_index, tree.size()).unwrap();
            verify_inclusion_tail(&leaves, first_index, tree.size(), root, &proof.path)
                .unwrap_or_else(|e| panic!("first_index={first_index} run_len={run_len}: {e:?}"));
        }
    }

    #[test]
    fn verify_inclusion_tail_rejects_tampered_interior_leaf() {
        let tree = build_tree(20);
        let root = tree.root_hash();
        let first_index = 13u64;
        let mut leaves: Vec<Hash> = (first_index..tree.size()).map(|i| tree.leaves()[i as usize]).collect();
        leaves[3] = Hash::sha256(b"tampered");
        let proof = prove_inclusion(&tree, first_index, tree.size()).unwrap();
        let err = verify_inclusion_tail(&leaves, first_index, tree.size(), root, &proof.path).unwrap_err();
        assert_eq!(err, MerkleError::Mismatch);
    }

    #[test]
    fn verify_inclusion_batch_accepts_valid_interior_run() {
        let tree = build_tree(20);
        let root = tree.root_hash();
        let first = 3u64;
        let len = 5u64;
        let start = prove_inclusion(&tree, first, 20).unwrap();
        let end = prove_inclusion(&tree, first + len - 1, 20).unwrap();
        let batch: Vec<Hash> = (first..first + len)
            .map(|i| tree.leaves()[i as usize])
            .collect();
        verify_inclusion_batch(&batch, first, 20, root, &start.path, &end.path).unwrap();
    }

    #[test]
    fn verify_inclusion_batch_rejects_tampered_leaf() {
        let tree = build_tree(20);
        let root = tree.root_hash();
        let first = 3u64;
        let len = 5u64;
        let start = prove_inclusion(&tree, first, 20).unwrap();
        let end = prove_inclusion(&tree, first + len - 1, 20).unwrap();
        let mut batch: Vec<Hash> = (first..first + len)
            .map(|i| tree.leaves()[i as usize])
            .collect();
        batch[2] = Hash::sha256(b"tampered");
        let err = verify_inclusion_batch(&batch, first, 20, root, &start.path, &end.path)
            .unwrap_err();
        assert_eq!(err, MerkleError::Mismatch);
    }
}
