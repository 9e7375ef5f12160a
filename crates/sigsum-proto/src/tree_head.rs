//! `TreeHead`, `SignedTreeHead`, `Cosignature`, `CosignedTreeHead`, and
//! their canonical signed-bytes ("checkpoint") forms.
//!
//! Grounded on `crates/protocol/src/registry.rs`'s `Checkpoint`/
//! `TimestampedCheckpoint` pair (a versioned-prefix struct implementing
//! `Signable`, plus a second struct layering a timestamp over it for the
//! witness-cosigned variant) — adapted to sigsum's exact checkpoint and
//! cosignature byte layouts (spec.md §4.2) rather than the teacher's
//! generic prefix-encoded form.

use thiserror::Error;

use sigsum_crypto::{base64_encode, Hash, PublicKey, Signable, Signature, Signer};

use crate::ascii::{parse_decimal, parse_hash, split_kv, strict_lines};

/// `"sigsum.org/v1/tree/" || lower_hex(SHA256(log_public_key))`, the string
/// identifying a log in every signed and cosigned byte string.
pub fn origin(log_key_hash: &Hash) -> String {
    format!("sigsum.org/v1/tree/{}", log_key_hash.to_hex())
}

/// A tree's size and root hash, with no signature attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHead {
    pub size: u64,
    pub root_hash: Hash,
}

impl TreeHead {
    /// The tree head of an empty tree.
    pub fn empty() -> Self {
        Self {
            size: 0,
            root_hash: sigsum_merkle::empty_tree_root(),
        }
    }
}

/// Failure modes for tree-head signing, cosigning, and ASCII decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeHeadError {
    #[error("log signature does not verify over the tree head")]
    InvalidLogSignature,
    #[error("witness signature does not verify over the cosigned tree head")]
    InvalidCosignature,
    #[error("malformed tree head ascii")]
    Malformed,
}

/// The exact bytes signed by a log over one of its own tree heads:
/// `O "\n" decimal(size) "\n" base64_std(root_hash) "\n"`.
struct Checkpoint<'a> {
    origin: &'a str,
    tree_head: &'a TreeHead,
}

impl Signable for Checkpoint<'_> {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.origin.as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(self.tree_head.size.to_string().as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(base64_encode(self.tree_head.root_hash.as_bytes()).as_bytes());
        buf.push(b'\n');
        buf
    }
}

/// A `TreeHead` plus the log's Ed25519 signature over its checkpoint bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTreeHead {
    pub tree_head: TreeHead,
    pub signature: Signature,
}

impl SignedTreeHead {
    /// Sign `tree_head` under `origin` with the log's own key.
    pub fn sign(tree_head: TreeHead, origin: &str, signer: &impl Signer) -> Self {
        let signature = Checkpoint {
            origin,
            tree_head: &tree_head,
        }
        .sign(signer);
        Self {
            tree_head,
            signature,
        }
    }

    /// Verify the log signature under `origin` and `log_public_key`.
    pub fn verify(&self, origin: &str, log_public_key: &PublicKey) -> Result<(), TreeHeadError> {
        Checkpoint {
            origin,
            tree_head: &self.tree_head,
        }
        .verify(log_public_key, &self.signature)
        .map_err(|_| TreeHeadError::InvalidLogSignature)
    }

    pub fn to_ascii_lines(&self) -> Vec<String> {
        vec![
            format!("size={}", self.tree_head.size),
            format!("root_hash={}", self.tree_head.root_hash.to_hex()),
            format!("signature={}", self.signature.to_hex()),
        ]
    }

    pub fn from_lines(lines: &[&str]) -> Result<(Self, usize), TreeHeadError> {
        if lines.len() < 3 {
            return Err(TreeHeadError::Malformed);
        }
        let size = expect_decimal(lines[0], "size")?;
        let root_hash = expect_hash(lines[1], "root_hash")?;
        let (key, value) = split_kv(lines[2]).ok_or(TreeHeadError::Malformed)?;
        if key != "signature" {
            return Err(TreeHeadError::Malformed);
        }
        let signature = value.parse().map_err(|_| TreeHeadError::Malformed)?;
        Ok((
            Self {
                tree_head: TreeHead { size, root_hash },
                signature,
            },
            3,
        ))
    }

    /// Full standalone ASCII encoding (`size=`/`root_hash=`/`signature=`
    /// lines, `\n`-terminated).
    pub fn to_ascii(&self) -> String {
        let mut out = self.to_ascii_lines().join("\n");
        out.push('\n');
        out
    }

    pub fn from_ascii(text: &str) -> Result<Self, TreeHeadError> {
        let lines = strict_lines(text).ok_or(TreeHeadError::Malformed)?;
        let (sth, consumed) = Self::from_lines(&lines)?;
        if consumed != lines.len() {
            return Err(TreeHeadError::Malformed);
        }
        Ok(sth)
    }
}

/// A witness's signature over a log's tree head, timestamped. The
/// witness's key-hash is carried by the enclosing [`CosignedTreeHead`],
/// not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cosignature {
    pub timestamp: u64,
    pub signature: Signature,
}

/// The exact bytes a witness signs: `"cosignature/v1\n" "time " decimal(t)
/// "\n" O "\n" decimal(size) "\n" base64_std(root_hash) "\n"`. The witness
/// key-hash is deliberately excluded: it is transport metadata, not part
/// of what's signed.
struct CosignatureInput<'a> {
    origin: &'a str,
    tree_head: &'a TreeHead,
    timestamp: u64,
}

impl Signable for CosignatureInput<'_> {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"cosignature/v1\n");
        buf.extend_from_slice(format!("time {}\n", self.timestamp).as_bytes());
        buf.extend_from_slice(self.origin.as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(self.tree_head.size.to_string().as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(base64_encode(self.tree_head.root_hash.as_bytes()).as_bytes());
        buf.push(b'\n');
        buf
    }
}

impl Cosignature {
    /// Cosign `tree_head` for log `origin` at `timestamp`.
    pub fn cosign(tree_head: &TreeHead, origin: &str, timestamp: u64, signer: &impl Signer) -> Self {
        let signature = CosignatureInput {
            origin,
            tree_head,
            timestamp,
        }
        .sign(signer);
        Self {
            timestamp,
            signature,
        }
    }

    /// Verify this cosignature under `witness_public_key` over `tree_head`
    /// for log `origin`.
    pub fn verify(
        &self,
        witness_public_key: &PublicKey,
        origin: &str,
        tree_head: &TreeHead,
    ) -> Result<(), TreeHeadError> {
        CosignatureInput {
            origin,
            tree_head,
            timestamp: self.timestamp,
        }
        .verify(witness_public_key, &self.signature)
        .map_err(|_| TreeHeadError::InvalidCosignature)
    }
}

/// A signed tree head plus zero or more witness cosignatures, keyed by
/// witness key-hash. Preserves the order cosignatures were added in
/// (matching how a log or witness would emit them on the wire); rejects a
/// duplicate key-hash rather than silently overwriting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CosignedTreeHead {
    pub signed_tree_head: Option<SignedTreeHead>,
    cosignatures: Vec<(Hash, Cosignature)>,
}

impl CosignedTreeHead {
    pub fn new(signed_tree_head: SignedTreeHead) -> Self {
        Self {
            signed_tree_head: Some(signed_tree_head),
            cosignatures: Vec::new(),
        }
    }

    /// Add a cosignature from `witness_key_hash`. Returns `false` without
    /// mutating if that witness has already cosigned.
    pub fn add_cosignature(&mut self, witness_key_hash: Hash, cosignature: Cosignature) -> bool {
        if self.cosignatures.iter().any(|(k, _)| *k == witness_key_hash) {
            return false;
        }
        self.cosignatures.push((witness_key_hash, cosignature));
        true
    }

    pub fn cosignatures(&self) -> &[(Hash, Cosignature)] {
        &self.cosignatures
    }

    pub fn to_ascii_lines(&self) -> Vec<String> {
        let mut lines = match &self.signed_tree_head {
            Some(sth) => sth.to_ascii_lines(),
            None => Vec::new(),
        };
        for (key_hash, cs) in &self.cosignatures {
            lines.push(format!(
                "cosignature={} {} {}",
                key_hash.to_hex(),
                cs.timestamp,
                cs.signature.to_hex()
            ));
        }
        lines
    }

    pub fn from_lines(lines: &[&str]) -> Result<Self, TreeHeadError> {
        let (signed_tree_head, mut i) = SignedTreeHead::from_lines(lines)?;
        let mut cth = Self::new(signed_tree_head);
        while i < lines.len() {
            let (key, value) = split_kv(lines[i]).ok_or(TreeHeadError::Malformed)?;
            if key != "cosignature" {
                return Err(TreeHeadError::Malformed);
            }
            let mut parts = value.split(' ');
            let key_hash = parts.next().and_then(parse_hash).ok_or(TreeHeadError::Malformed)?;
            let timestamp = parts
                .next()
                .and_then(parse_decimal)
                .ok_or(TreeHeadError::Malformed)?;
            let signature = parts
                .next()
                .ok_or(TreeHeadError::Malformed)?
                .parse()
                .map_err(|_| TreeHeadError::Malformed)?;
            if parts.next().is_some() {
                return Err(TreeHeadError::Malformed);
            }
            if !cth.add_cosignature(key_hash, Cosignature { timestamp, signature }) {
                return Err(TreeHeadError::Malformed);
            }
            i += 1;
        }
        Ok(cth)
    }

    pub fn to_ascii(&self) -> String {
        let mut out = self.to_ascii_lines().join("\n");
        out.push('\n');
        out
    }

    pub fn from_ascii(text: &str) -> Result<Self, TreeHeadError> {
        let lines = strict_lines(text).ok_or(TreeHeadError::Malformed)?;
        Self::from_lines(&lines)
    }
}

fn expect_decimal(line: &str, key: &str) -> Result<u64, TreeHeadError> {
    let (k, v) = split_kv(line).ok_or(TreeHeadError::Malformed)?;
    if k != key {
        return Err(TreeHeadError::Malformed);
    }
    parse_decimal(v).ok_or(TreeHeadError::Malformed)
}

fn expect_hash(line: &str, key: &str) -> Result<Hash, TreeHeadError> {
    let (k, v) = split_kv(line).ok_or(TreeHeadError::Malformed)?;
    if k != key {
        return Err(TreeHeadError::Malformed);
    }
    parse_hash(v).ok_or(TreeHeadError::Malformed)
}
