//! `Leaf`, `LeafRequest`, and the leaf-signed-bytes and leaf-hash forms
//! that bind a submitted message to the tree.
//!
//! Grounded on the same [`sigsum_crypto::Signable`] pattern as
//! [`crate::tree_head`], applied to the 32-byte leaf-signed-bytes form.
//!
//! The log never sees a submitter's real content: `LeafRequest::message`
//! is already a 32-byte digest the submitter computed and signed
//! themselves, and `Leaf::checksum` is one further `SHA256` over those 32
//! bytes. This is the literal wire contract (`message` is typed `Hash`,
//! not an arbitrary-length byte string) — the "arbitrary-length message
//! `m`" of the underlying leaf-signing primitive is instantiated with
//! `m = message`.

use thiserror::Error;

use sigsum_crypto::{Hash, PrivateKey, PublicKey, Signable, Signature};
use sigsum_merkle::hash_leaf;

use crate::ascii::{parse_hash, split_kv, strict_lines};

/// Domain-separation prefix for the bytes a submitter signs over a
/// message's checksum. Not specified byte-for-byte by name in the wire
/// grammar, but required to vary per deployment namespace; fixed here to
/// a single sigsum-wide constant since this build targets one namespace.
pub const LEAF_NAMESPACE: &[u8] = b"sigsum.org/v1/tree-leaf";

/// The exact bytes a submitter signs: the deployment namespace followed
/// by the raw 32-byte checksum, with no length framing.
struct LeafMessage<'a> {
    checksum: &'a Hash,
}

impl Signable for LeafMessage<'_> {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LEAF_NAMESPACE.len() + 32);
        buf.extend_from_slice(LEAF_NAMESPACE);
        buf.extend_from_slice(self.checksum.as_bytes());
        buf
    }
}

/// Sign checksum `c = SHA256(m)` on behalf of message `m`.
pub fn sign_leaf_message(signer: &PrivateKey, message: &[u8]) -> Signature {
    let checksum = Hash::sha256(message);
    LeafMessage { checksum: &checksum }.sign(signer)
}

/// Verify `signature` was produced by [`sign_leaf_message`] over `message`
/// under `public_key`.
pub fn verify_leaf_message(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let checksum = Hash::sha256(message);
    verify_leaf_checksum(public_key, &checksum, signature)
}

/// Verify `signature` over an already-computed `checksum`, without
/// hashing again. For callers (like a monitor re-checking a [`Leaf`]
/// fetched from the log) that already hold the checksum rather than the
/// message it was derived from.
pub fn verify_leaf_checksum(public_key: &PublicKey, checksum: &Hash, signature: &Signature) -> bool {
    LeafMessage { checksum }.verify(public_key, signature).is_ok()
}

/// A request to add a leaf: the submitter's message digest, their
/// signature over it, and their public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafRequest {
    pub message: Hash,
    pub signature: Signature,
    pub public_key: PublicKey,
}

/// A verified leaf entry: the message's checksum, the submitter's
/// signature, and the submitter's key-hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub checksum: Hash,
    pub signature: Signature,
    pub key_hash: Hash,
}

/// Failure verifying a [`LeafRequest`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("leaf request signature does not verify under the submitter's public key")]
pub struct InvalidLeafSignature;

/// Failure decoding a [`LeafRequest`] from its ASCII wire form.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("malformed leaf request ascii")]
pub struct LeafRequestAsciiError;

impl LeafRequest {
    pub fn new(message: Hash, signature: Signature, public_key: PublicKey) -> Self {
        Self {
            message,
            signature,
            public_key,
        }
    }

    /// Verify the submitter's signature and, on success, produce the
    /// corresponding [`Leaf`].
    pub fn verify(&self) -> Result<Leaf, InvalidLeafSignature> {
        if !verify_leaf_message(&self.public_key, self.message.as_bytes(), &self.signature) {
            return Err(InvalidLeafSignature);
        }
        Ok(Leaf {
            checksum: Hash::sha256(self.message.as_bytes()),
            signature: self.signature,
            key_hash: self.public_key.key_hash(),
        })
    }

    /// `message=<hex>\nsignature=<hex>\npublic_key=<hex>\n`.
    pub fn to_ascii(&self) -> String {
        format!(
            "message={}\nsignature={}\npublic_key={}\n",
            self.message.to_hex(),
            self.signature.to_hex(),
            self.public_key.to_hex(),
        )
    }

    pub fn from_ascii(text: &str) -> Result<Self, LeafRequestAsciiError> {
        let lines = strict_lines(text).ok_or(LeafRequestAsciiError)?;
        if lines.len() != 3 {
            return Err(LeafRequestAsciiError);
        }
        let (mk, mv) = split_kv(lines[0]).ok_or(LeafRequestAsciiError)?;
        if mk != "message" {
            return Err(LeafRequestAsciiError);
        }
        let message = parse_hash(mv).ok_or(LeafRequestAsciiError)?;
        let (sk, sv) = split_kv(lines[1]).ok_or(LeafRequestAsciiError)?;
        if sk != "signature" {
            return Err(LeafRequestAsciiError);
        }
        let signature = sv.parse().map_err(|_| LeafRequestAsciiError)?;
        let (pk, pv) = split_kv(lines[2]).ok_or(LeafRequestAsciiError)?;
        if pk != "public_key" {
            return Err(LeafRequestAsciiError);
        }
        let public_key = pv.parse().map_err(|_| LeafRequestAsciiError)?;
        Ok(Self {
            message,
            signature,
            public_key,
        })
    }
}

impl Leaf {
    /// `SHA256(0x00 || checksum || signature || key_hash)`, the value
    /// actually stored in the Merkle tree.
    pub fn leaf_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(32 + 64 + 32);
        buf.extend_from_slice(self.checksum.as_bytes());
        buf.extend_from_slice(&self.signature.as_bytes());
        buf.extend_from_slice(self.key_hash.as_bytes());
        hash_leaf(&buf)
    }

    fn to_ascii_line(&self) -> String {
        format!(
            "leaf={} {} {}\n",
            self.checksum.to_hex(),
            self.signature.to_hex(),
            self.key_hash.to_hex()
        )
    }

    fn from_ascii_line(line: &str) -> Option<Self> {
        let (key, value) = split_kv(line)?;
        if key != "leaf" {
            return None;
        }
        let mut parts = value.split(' ');
        let checksum = parts.next().and_then(parse_hash)?;
        let signature = parts.next()?.parse().ok()?;
        let key_hash = parts.next().and_then(parse_hash)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            checksum,
            signature,
            key_hash,
        })
    }
}

/// Failure decoding a batch of `Leaves ASCII` (the `get-leaves` response
/// body: one `leaf=<checksum> <signature> <key_hash>` line per entry).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("malformed leaves ascii")]
pub struct LeavesAsciiError;

/// Encode a batch of leaves as `Leaves ASCII`, in order.
pub fn leaves_to_ascii(leaves: &[Leaf]) -> String {
    leaves.iter().map(Leaf::to_ascii_line).collect()
}

/// Decode a `Leaves ASCII` batch. Rejects a missing trailing newline or
/// trailing whitespace on any line, matching the rest of the wire grammar.
pub fn leaves_from_ascii(text: &str) -> Result<Vec<Leaf>, LeavesAsciiError> {
    let lines = strict_lines(text).ok_or(LeavesAsciiError)?;
    lines.iter().map(|l| Leaf::from_ascii_line(l).ok_or(LeavesAsciiError)).collect()
}
