//! The `add-tree-head` request body: a log's proposed signed tree head,
//! the size the witness last cosigned, and a consistency proof between
//! the two.

use thiserror::Error;

use sigsum_crypto::Hash;
use sigsum_merkle::ConsistencyProof;
use sigsum_proto::tree_head::TreeHeadError;
use sigsum_proto::SignedTreeHead;

mod ascii_helpers {
    pub(crate) fn split_kv(line: &str) -> Option<(&str, &str)> {
        line.split_once('=')
    }
}

/// A witness's request body for `add-tree-head`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessAddTreeHead {
    pub key_hash: Hash,
    pub old_size: u64,
    pub proposed: SignedTreeHead,
    pub consistency_proof: ConsistencyProof,
}

/// Failure decoding a [`WitnessAddTreeHead`] from its ASCII wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddTreeHeadAsciiError {
    #[error("malformed add-tree-head ascii")]
    Malformed,
}

impl From<TreeHeadError> for AddTreeHeadAsciiError {
    fn from(_: TreeHeadError) -> Self {
        AddTreeHeadAsciiError::Malformed
    }
}

impl WitnessAddTreeHead {
    /// `key_hash=` and `old_size=` header lines, then the signed tree
    /// head's own three lines, then zero or more `node_hash=` lines for
    /// the consistency proof.
    pub fn to_ascii(&self) -> String {
        let mut out = format!("key_hash={}\n", self.key_hash.to_hex());
        out.push_str(&format!("old_size={}\n", self.old_size));
        out.push_str(&self.proposed.to_ascii());
        for node in &self.consistency_proof.path {
            out.push_str(&format!("node_hash={}\n", node.to_hex()));
        }
        out
    }

    pub fn from_ascii(text: &str) -> Result<Self, AddTreeHeadAsciiError> {
        let body = text.strip_suffix('\n').ok_or(AddTreeHeadAsciiError::Malformed)?;
        if body.is_empty() && !text.is_empty() {
            return Err(AddTreeHeadAsciiError::Malformed);
        }
        let lines: Vec<&str> = if text.is_empty() { Vec::new() } else { body.split('\n').collect() };
        if lines.iter().any(|l| l.ends_with(' ') || l.ends_with('\t')) {
            return Err(AddTreeHeadAsciiError::Malformed);
        }
        if lines.len() < 5 {
            return Err(AddTreeHeadAsciiError::Malformed);
        }
        let (kk, kv) = ascii_helpers::split_kv(lines[0]).ok_or(AddTreeHeadAsciiError::Malformed)?;
        if kk != "key_hash" {
            return Err(AddTreeHeadAsciiError::Malformed);
        }
        let key_hash: Hash = kv.parse().map_err(|_| AddTreeHeadAsciiError::Malformed)?;

        let (ok, ov) = ascii_helpers::split_kv(lines[1]).ok_or(AddTreeHeadAsciiError::Malformed)?;
        if ok != "old_size" {
            return Err(AddTreeHeadAsciiError::Malformed);
        }
        let old_size: u64 = ov.parse().map_err(|_| AddTreeHeadAsciiError::Malformed)?;

        let (proposed, consumed) = SignedTreeHead::from_lines(&lines[2..])?;
        let mut path = Vec::new();
        for line in &lines[2 + consumed..] {
            let (key, value) = ascii_helpers::split_kv(line).ok_or(AddTreeHeadAsciiError::Malformed)?;
            if key != "node_hash" {
                return Err(AddTreeHeadAsciiError::Malformed);
            }
            let hash: Hash = value.parse().map_err(|_| AddTreeHeadAsciiError::Malformed)?;
            path.push(hash);
        }

        Ok(Self {
            key_hash,
            old_size,
            proposed,
            consistency_proof: ConsistencyProof { path },
        })
    }
}
