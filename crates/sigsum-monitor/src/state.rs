//! Resume-state persistence: one file per log, named by the lower-case
//! hex of `SHA256(log_public_key)`, holding the last-seen cosigned tree
//! head and `next_leaf_index`. Grounded on the same tempfile+rename
//! pattern as `sigsum-witness`'s persistence (`crates/client-storage/
//! src/storage.rs`), with updates serialised by the owning per-log task
//! rather than an explicit lock — matching spec.md §5's note that C9's
//! coarse map lock only protects lookups, not file I/O.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use sigsum_crypto::Hash;
use sigsum_proto::CosignedTreeHead;

use crate::error::MonitorError;

/// The durable position of a monitored log: the last tree head it
/// cosigned/observed, and how many leaves have been verified and
/// delivered so far.
#[derive(Debug, Clone)]
pub struct ResumeState {
    pub tree_head: CosignedTreeHead,
    pub next_leaf_index: u64,
}

fn file_path(dir: &Path, log_key_hash: &Hash) -> PathBuf {
    dir.join(log_key_hash.to_hex())
}

/// Load the resume state for `log_key_hash` from `dir`, or `None` if no
/// file exists yet (a log being monitored for the first time).
pub fn load(dir: &Path, log_key_hash: &Hash) -> Result<Option<ResumeState>, MonitorError> {
    let path = file_path(dir, log_key_hash);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    let (head, tail) = text
        .split_once("\n\n")
        .ok_or_else(|| MonitorError::InvalidResumeState("missing blank line separator".into()))?;
    let tree_head = CosignedTreeHead::from_ascii(&format!("{head}\n"))
        .map_err(|e| MonitorError::InvalidResumeState(e.to_string()))?;
    let next_leaf_index = tail
        .strip_prefix("next_leaf_index=")
        .and_then(|v| v.strip_suffix('\n'))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| MonitorError::InvalidResumeState("malformed next_leaf_index line".into()))?;
    Ok(Some(ResumeState {
        tree_head,
        next_leaf_index,
    }))
}

/// Atomically replace the resume file for `log_key_hash`. Never called
/// with a state that would shrink either field; callers enforce that.
pub fn store(dir: &Path, log_key_hash: &Hash, state: &ResumeState) -> Result<(), MonitorError> {
    fs::create_dir_all(dir)?;
    let mut contents = state.tree_head.to_ascii();
    contents.push('\n');
    contents.push_str(&format!("next_leaf_index={}\n", state.next_leaf_index));
    let tmp = NamedTempFile::new_in(dir)?;
    fs::write(tmp.path(), contents)?;
    tmp.persist(file_path(dir, log_key_hash)).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::OsRng;
    use sigsum_crypto::PrivateKey;
    use sigsum_proto::tree_head::{origin, SignedTreeHead, TreeHead};

    #[test]
    fn store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log_key = PrivateKey::generate(&mut OsRng);
        let log_key_hash = log_key.public_key().key_hash();
        let origin = origin(&log_key_hash);
        let tree_head = TreeHead {
            size: 3,
            root_hash: Hash::sha256(b"root"),
        };
        let sth = SignedTreeHead::sign(tree_head, &origin, &log_key);
        let cth = CosignedTreeHead::new(sth);

        let state = ResumeState {
            tree_head: cth,
            next_leaf_index: 3,
        };
        store(dir.path(), &log_key_hash, &state).unwrap();
        let loaded = load(dir.path(), &log_key_hash).unwrap().unwrap();
        assert_eq!(loaded.next_leaf_index, 3);
        assert_eq!(loaded.tree_head, state.tree_head);
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let log_key_hash = Hash::sha256(b"some log");
        assert!(load(dir.path(), &log_key_hash).unwrap().is_none());
    }
}
