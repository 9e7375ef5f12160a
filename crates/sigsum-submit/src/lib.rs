//! Submission engine: turns `LeafRequest`s into `SigsumProof`s against a
//! policy-ordered set of logs.
//!
//! One worker task runs per log (grounded on `crates/server/src/services/
//! data/log.rs`'s `spawn`-plus-`mpsc`-plus-`CancellationToken` shape); a
//! coordinator task fails an item over to the next worker in policy order
//! on a permanent failure, and finalizes each caller's result.

mod config;
mod engine;
mod error;
mod worker;

pub use config::SubmitConfig;
pub use engine::SubmitEngine;
pub use error::SubmitError;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rand::rngs::OsRng;

    use sigsum_api::{ApiError, LogApi, Outcome};
    use sigsum_crypto::{Hash, PrivateKey, PublicKey};
    use sigsum_merkle::{prove_inclusion, ConsistencyProof, InclusionProof, Tree};
    use sigsum_proto::{
        sign_leaf_message, Cosignature, CosignedTreeHead, Leaf, LeafRequest, Policy, SignedTreeHead, TreeHead,
    };

    use super::*;

    /// A single-log in-memory double standing in for an HTTP client:
    /// accepts every leaf immediately as persisted and serves whatever
    /// tree state it currently holds.
    struct FakeLog {
        log_key: PrivateKey,
        witness_key: PrivateKey,
        tree: std::sync::Mutex<Tree>,
        add_leaf_calls: AtomicUsize,
    }

    impl FakeLog {
        fn new() -> (Self, PublicKey) {
            let log_key = PrivateKey::generate(&mut OsRng);
            let witness_key = PrivateKey::generate(&mut OsRng);
            let public_key = log_key.public_key();
            (
                Self {
                    log_key,
                    witness_key,
                    tree: std::sync::Mutex::new(Tree::new()),
                    add_leaf_calls: AtomicUsize::new(0),
                },
                public_key,
            )
        }

        fn cosigned_tree_head(&self) -> CosignedTreeHead {
            let tree = self.tree.lock().unwrap();
            let origin = sigsum_proto::origin(&self.log_key.public_key().key_hash());
            let tree_head = TreeHead {
                size: tree.size(),
                root_hash: tree.root_hash(),
            };
            let sth = SignedTreeHead::sign(tree_head, &origin, &self.log_key);
            let mut cth = CosignedTreeHead::new(sth);
            cth.add_cosignature(
                self.witness_key.public_key().key_hash(),
                Cosignature::cosign(&tree_head, &origin, 1_700_000_000, &self.witness_key),
            );
            cth
        }
    }

    #[async_trait]
    impl LogApi for FakeLog {
        async fn get_tree_head(&self) -> Result<CosignedTreeHead, ApiError> {
            Ok(self.cosigned_tree_head())
        }

        async fn get_inclusion_proof(&self, size: u64, leaf_hash: Hash) -> Result<InclusionProof, ApiError> {
            let tree = self.tree.lock().unwrap();
            let index = tree.get_leaf_index(&leaf_hash).ok_or(ApiError::NotFound)?;
            prove_inclusion(&tree, index, size).map_err(|_| ApiError::NotFound)
        }

        async fn get_consistency_proof(&self, _old_size: u64, _new_size: u64) -> Result<ConsistencyProof, ApiError> {
            Ok(ConsistencyProof::default())
        }

        async fn get_leaves(&self, _start: u64, _end: u64) -> Result<Vec<Leaf>, ApiError> {
            Ok(Vec::new())
        }

        async fn add_leaf(&self, request: &LeafRequest, _token: Option<(&str, &str)>) -> Result<Outcome, ApiError> {
            self.add_leaf_calls.fetch_add(1, Ordering::SeqCst);
            let leaf = request.verify().map_err(|_| ApiError::Forbidden("bad signature".into()))?;
            let mut tree = self.tree.lock().unwrap();
            tree.add_leaf_hash(leaf.leaf_hash());
            Ok(Outcome::Persisted)
        }
    }

    #[tokio::test]
    async fn single_log_submission_produces_a_verifiable_proof() {
        let (log, log_public_key) = FakeLog::new();
        let witness_public_key = log.witness_key.public_key();
        let log_key_hash = log_public_key.key_hash();
        let policy = Arc::new(Policy::new(
            vec![(log_key_hash, log_public_key)],
            vec![(witness_public_key.key_hash(), witness_public_key)],
            1,
        ));

        let client: Arc<dyn LogApi> = Arc::new(log);
        let engine = SubmitEngine::new(policy.clone(), vec![(log_key_hash, client)], SubmitConfig::default());

        let submitter = PrivateKey::generate(&mut OsRng);
        let message = Hash::sha256(b"first entry");
        let signature = sign_leaf_message(&submitter, message.as_bytes());
        let request = LeafRequest::new(message, signature, submitter.public_key());

        let handle = engine.submit(request).await;
        let proof = handle.await.unwrap().unwrap();
        proof.verify(&message, &submitter.public_key(), &policy).unwrap();

        assert!(engine.close().await.is_none());
    }

    #[tokio::test]
    async fn submit_and_wait_resolves_every_request_in_order() {
        let (log, log_public_key) = FakeLog::new();
        let witness_public_key = log.witness_key.public_key();
        let log_key_hash = log_public_key.key_hash();
        let policy = Arc::new(Policy::new(
            vec![(log_key_hash, log_public_key)],
            vec![(witness_public_key.key_hash(), witness_public_key)],
            1,
        ));

        let client: Arc<dyn LogApi> = Arc::new(log);
        let engine = SubmitEngine::new(policy.clone(), vec![(log_key_hash, client)], SubmitConfig::default());

        let submitter = PrivateKey::generate(&mut OsRng);
        let mut requests = Vec::new();
        let mut messages = Vec::new();
        for i in 0..4u8 {
            let message = Hash::sha256(&[i; 4]);
            let signature = sign_leaf_message(&submitter, message.as_bytes());
            requests.push(LeafRequest::new(message, signature, submitter.public_key()));
            messages.push(message);
        }

        let results = engine.submit_and_wait(requests).await;
        assert_eq!(results.len(), 4);
        for (result, message) in results.into_iter().zip(messages) {
            let proof = result.unwrap();
            proof.verify(&message, &submitter.public_key(), &policy).unwrap();
        }

        assert!(engine.close().await.is_none());
    }

    #[tokio::test]
    async fn forbidden_leaf_is_rejected_without_hanging() {
        let (log, log_public_key) = FakeLog::new();
        let witness_public_key = log.witness_key.public_key();
        let log_key_hash = log_public_key.key_hash();
        let policy = Arc::new(Policy::new(
            vec![(log_key_hash, log_public_key)],
            vec![(witness_public_key.key_hash(), witness_public_key)],
            1,
        ));

        let client: Arc<dyn LogApi> = Arc::new(log);
        let engine = SubmitEngine::new(policy, vec![(log_key_hash, client)], SubmitConfig::default());

        let submitter = PrivateKey::generate(&mut OsRng);
        let other = PrivateKey::generate(&mut OsRng);
        let message = Hash::sha256(b"tampered leaf");
        // Signed by a key that doesn't match `public_key`, so verify() fails locally.
        let signature = sign_leaf_message(&other, message.as_bytes());
        let request = LeafRequest::new(message, signature, submitter.public_key());

        let handle = engine.submit(request).await;
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SubmitError::InvalidLeafSignature));

        engine.close().await;
    }
}
