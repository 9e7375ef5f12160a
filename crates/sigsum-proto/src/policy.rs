//! Policy engine (C6): an immutable, once-loaded snapshot of trusted log
//! and witness public keys plus the witness quorum required to accept a
//! cosigned tree head.
//!
//! No direct teacher analogue beyond "a policy object is an immutable
//! loaded snapshot", already implicit in how the teacher treats a
//! `Config`; the verification procedure itself is spec.md §4.5.

use std::collections::HashMap;

use thiserror::Error;

use sigsum_crypto::{Hash, PublicKey};

use crate::tree_head::{origin, CosignedTreeHead, TreeHead};

/// Failure modes of [`Policy::verify_cosigned_tree_head`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    #[error("log {0} not configured in policy")]
    UnknownLog(Hash),
    #[error("log tree head signature invalid")]
    InvalidLogSignature,
    #[error("fewer than the required quorum of witnesses cosigned")]
    QuorumNotMet,
}

/// An immutable set of trusted logs and witnesses plus a witness quorum.
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Policy {
    logs: HashMap<Hash, PublicKey>,
    witnesses: HashMap<Hash, PublicKey>,
    quorum: usize,
}

impl Policy {
    pub fn new(logs: Vec<(Hash, PublicKey)>, witnesses: Vec<(Hash, PublicKey)>, quorum: usize) -> Self {
        Self {
            logs: logs.into_iter().collect(),
            witnesses: witnesses.into_iter().collect(),
            quorum,
        }
    }

    pub fn logs(&self) -> &HashMap<Hash, PublicKey> {
        &self.logs
    }

    pub fn witnesses(&self) -> &HashMap<Hash, PublicKey> {
        &self.witnesses
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// `VerifyCosignedTreeHead(log_key_hash, cth)`: the log must be
    /// configured and its signature must verify; at least `quorum`
    /// configured witnesses must have a valid cosignature over the same
    /// tree head. Returns the verified [`TreeHead`] on success.
    pub fn verify_cosigned_tree_head(
        &self,
        log_key_hash: Hash,
        cth: &CosignedTreeHead,
    ) -> Result<TreeHead, PolicyError> {
        let log_public_key = self.logs.get(&log_key_hash).ok_or(PolicyError::UnknownLog(log_key_hash))?;
        let signed_tree_head = cth.signed_tree_head.as_ref().ok_or(PolicyError::InvalidLogSignature)?;
        let log_origin = origin(&log_key_hash);
        signed_tree_head
            .verify(&log_origin, log_public_key)
            .map_err(|_| PolicyError::InvalidLogSignature)?;

        let tree_head = signed_tree_head.tree_head;
        let accepted = cth
            .cosignatures()
            .iter()
            .filter(|(witness_key_hash, cosignature)| {
                self.witnesses
                    .get(witness_key_hash)
                    .is_some_and(|pk| cosignature.verify(pk, &log_origin, &tree_head).is_ok())
            })
            .count();

        if accepted < self.quorum {
            return Err(PolicyError::QuorumNotMet);
        }
        Ok(tree_head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::OsRng;
    use sigsum_crypto::{Hash as CryptoHash, PrivateKey};

    use crate::tree_head::{Cosignature, SignedTreeHead};

    fn setup() -> (PrivateKey, PrivateKey, PrivateKey, TreeHead, Policy) {
        let log_key = PrivateKey::generate(&mut OsRng);
        let witness_a = PrivateKey::generate(&mut OsRng);
        let witness_b = PrivateKey::generate(&mut OsRng);
        let tree_head = TreeHead {
            size: 5,
            root_hash: CryptoHash::sha256(b"root"),
        };
        let policy = Policy::new(
            vec![(log_key.public_key().key_hash(), log_key.public_key())],
            vec![
                (witness_a.public_key().key_hash(), witness_a.public_key()),
                (witness_b.public_key().key_hash(), witness_b.public_key()),
            ],
            2,
        );
        (log_key, witness_a, witness_b, tree_head, policy)
    }

    #[test]
    fn accepts_when_quorum_met() {
        let (log_key, witness_a, witness_b, tree_head, policy) = setup();
        let origin = origin(&log_key.public_key().key_hash());
        let sth = SignedTreeHead::sign(tree_head, &origin, &log_key);
        let mut cth = CosignedTreeHead::new(sth);
        cth.add_cosignature(
            witness_a.public_key().key_hash(),
            Cosignature::cosign(&tree_head, &origin, 1, &witness_a),
        );
        cth.add_cosignature(
            witness_b.public_key().key_hash(),
            Cosignature::cosign(&tree_head, &origin, 2, &witness_b),
        );
        let verified = policy
            .verify_cosigned_tree_head(log_key.public_key().key_hash(), &cth)
            .unwrap();
        assert_eq!(verified, tree_head);
    }

    #[test]
    fn rejects_when_quorum_not_met() {
        let (log_key, witness_a, _witness_b, tree_head, policy) = setup();
        let origin = origin(&log_key.public_key().key_hash());
        let sth = SignedTreeHead::sign(tree_head, &origin, &log_key);
        let mut cth = CosignedTreeHead::new(sth);
        cth.add_cosignature(
            witness_a.public_key().key_hash(),
            Cosignature::cosign(&tree_head, &origin, 1, &witness_a),
        );
        let err = policy
            .verify_cosigned_tree_head(log_key.public_key().key_hash(), &cth)
            .unwrap_err();
        assert_eq!(err, PolicyError::QuorumNotMet);
    }

    #[test]
    fn rejects_unconfigured_witness_cosignature() {
        let (log_key, _witness_a, _witness_b, tree_head, policy) = setup();
        let stranger = PrivateKey::generate(&mut OsRng);
        let origin = origin(&log_key.public_key().key_hash());
        let sth = SignedTreeHead::sign(tree_head, &origin, &log_key);
        let mut cth = CosignedTreeHead::new(sth);
        cth.add_cosignature(
            stranger.public_key().key_hash(),
            Cosignature::cosign(&tree_head, &origin, 1, &stranger),
        );
        let err = policy
            .verify_cosigned_tree_head(log_key.public_key().key_hash(), &cth)
            .unwrap_err();
        assert_eq!(err, PolicyError::QuorumNotMet);
    }

    #[test]
    fn rejects_unknown_log() {
        let (_log_key, _witness_a, _witness_b, tree_head, policy) = setup();
        let other_log = PrivateKey::generate(&mut OsRng);
        let origin = origin(&other_log.public_key().key_hash());
        let sth = SignedTreeHead::sign(tree_head, &origin, &other_log);
        let cth = CosignedTreeHead::new(sth);
        let err = policy
            .verify_cosigned_tree_head(other_log.public_key().key_hash(), &cth)
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownLog(_)));
    }
}
