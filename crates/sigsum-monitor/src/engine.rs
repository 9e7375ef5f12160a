//! Per-log tailing loop: spec.md §4.8's tree-head refresh, paged leaf
//! retrieval, and batch inclusion verification.
//!
//! Grounded on the same `tokio::spawn` / `tokio::select!` /
//! `CancellationToken` shape as `sigsum-submit`'s worker, here driving a
//! `sleep`-paced loop instead of a channel-driven one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sigsum_api::LogApi;
use sigsum_crypto::{Hash, PublicKey};
use sigsum_merkle::{verify_consistency, verify_inclusion, verify_inclusion_batch, verify_inclusion_tail};
use sigsum_proto::tree_head::{origin, TreeHead};
use sigsum_proto::{verify_leaf_checksum, CosignedTreeHead, Leaf};

use crate::callbacks::MonitorCallbacks;
use crate::config::MonitorConfig;
use crate::error::{Alert, MonitorError};
use crate::state::{self, ResumeState};

/// One log's tailing loop: owns its client, its log key, the registry of
/// submit-keys whose leaf signatures it re-verifies, and its resume file.
pub struct MonitorLoop {
    log_key_hash: Hash,
    log_public_key: PublicKey,
    client: Arc<dyn LogApi>,
    submit_keys: HashMap<Hash, PublicKey>,
    callbacks: Arc<dyn MonitorCallbacks>,
    config: MonitorConfig,
    resume_dir: PathBuf,
}

impl MonitorLoop {
    pub fn new(
        log_public_key: PublicKey,
        client: Arc<dyn LogApi>,
        submit_keys: HashMap<Hash, PublicKey>,
        callbacks: Arc<dyn MonitorCallbacks>,
        config: MonitorConfig,
        resume_dir: PathBuf,
    ) -> Self {
        Self {
            log_key_hash: log_public_key.key_hash(),
            log_public_key,
            client,
            submit_keys,
            callbacks,
            config,
            resume_dir,
        }
    }

    /// Run until `token` is cancelled. Ordinary log-side problems become
    /// `Alert`s delivered via the callbacks and never stop the loop; this
    /// only returns an error for a corrupt resume file at startup or an
    /// explicit cancellation.
    pub async fn run(self, token: CancellationToken) -> Result<(), MonitorError> {
        let mut resume = state::load(&self.resume_dir, &self.log_key_hash)?.unwrap_or_else(|| ResumeState {
            tree_head: CosignedTreeHead::default(),
            next_leaf_index: 0,
        });
        let mut local = resume
            .tree_head
            .signed_tree_head
            .as_ref()
            .map(|sth| sth.tree_head)
            .unwrap_or_else(TreeHead::empty);

        loop {
            if let Err(alert) = self.pass(&mut local, &mut resume).await {
                self.callbacks.alert(self.log_key_hash, alert);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.query_interval) => {}
                _ = token.cancelled() => return Err(MonitorError::Cancelled),
            }
        }
    }

    /// One pass: refresh the tree head, then drain however many leaves
    /// are newly visible, one page at a time.
    async fn pass(&self, local: &mut TreeHead, resume: &mut ResumeState) -> Result<(), Alert> {
        let origin = origin(&self.log_key_hash);
        let cth = self
            .client
            .get_tree_head()
            .await
            .map_err(|e| Alert::LogError(e.to_string()))?;
        let sth = cth
            .signed_tree_head
            .clone()
            .ok_or_else(|| Alert::Other("tree head response carried no signed tree head".into()))?;
        sth.verify(&origin, &self.log_public_key)
            .map_err(|_| Alert::InvalidLogSignature)?;

        if sth.tree_head.size > local.size {
            if local.size > 0 {
                let consistency = self
                    .client
                    .get_consistency_proof(local.size, sth.tree_head.size)
                    .await
                    .map_err(|e| Alert::LogError(e.to_string()))?;
                verify_consistency(
                    local.size,
                    sth.tree_head.size,
                    local.root_hash,
                    sth.tree_head.root_hash,
                    &consistency.path,
                )
                .map_err(|_| Alert::InconsistentTreeHead)?;
            }
            *local = sth.tree_head;
            resume.tree_head = cth;
            self.callbacks.new_tree_head(self.log_key_hash, *local);
            state::store(&self.resume_dir, &self.log_key_hash, resume).map_err(|e| Alert::Other(e.to_string()))?;
        }

        while resume.next_leaf_index < local.size {
            self.drain_one_batch(local, resume).await?;
        }
        Ok(())
    }

    async fn drain_one_batch(&self, local: &TreeHead, resume: &mut ResumeState) -> Result<(), Alert> {
        let start = resume.next_leaf_index;
        let end = (start + self.config.batch_size).min(local.size);
        let leaves = self
            .client
            .get_leaves(start, end)
            .await
            .map_err(|e| Alert::LogError(e.to_string()))?;
        if leaves.is_empty() {
            return Err(Alert::Other(format!("get-leaves [{start}, {end}) returned no entries")));
        }

        let leaf_hashes: Vec<Hash> = leaves.iter().map(Leaf::leaf_hash).collect();
        self.verify_batch_inclusion(&leaf_hashes, start, local)
            .await
            .map_err(|e| Alert::Other(e.to_string()))?;

        let mut delivered = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            match self.submit_keys.get(&leaf.key_hash) {
                // The log only ever stores a checksum, never the
                // submitter's real content (see sigsum-proto::leaf), so
                // re-verification checks the checksum directly rather
                // than re-hashing a message the monitor doesn't have.
                Some(public_key) if !verify_leaf_checksum(public_key, &leaf.checksum, &leaf.signature) => {
                    self.callbacks.alert(
                        self.log_key_hash,
                        Alert::InvalidLeafSignature { key_hash: leaf.key_hash },
                    );
                }
                _ => delivered.push(*leaf),
            }
        }

        self.callbacks.new_leaves(self.log_key_hash, start, &delivered);
        resume.next_leaf_index = end;
        state::store(&self.resume_dir, &self.log_key_hash, resume).map_err(|e| Alert::Other(e.to_string()))?;
        Ok(())
    }

    /// Prove that `leaf_hashes` are really the leaves at
    /// `[first_index, first_index + leaf_hashes.len())` in the tree
    /// described by `local`, picking the proof the page's shape calls for:
    /// plain single-leaf inclusion for a lone leaf, the tail specialisation
    /// when the page reaches `local.size`, and a two-sided batch proof
    /// otherwise.
    async fn verify_batch_inclusion(
        &self,
        leaf_hashes: &[Hash],
        first_index: u64,
        local: &TreeHead,
    ) -> Result<(), String> {
        let last_index = first_index + leaf_hashes.len() as u64 - 1;

        if leaf_hashes.len() == 1 {
            let proof = self
                .client
                .get_inclusion_proof(local.size, leaf_hashes[0])
                .await
                .map_err(|e| e.to_string())?;
            return verify_inclusion(leaf_hashes[0], first_index, local.size, local.root_hash, &proof.path)
                .map_err(|e| e.to_string());
        }

        if last_index + 1 == local.size {
            let proof = self
                .client
                .get_inclusion_proof(local.size, leaf_hashes[0])
                .await
                .map_err(|e| e.to_string())?;
            return verify_inclusion_tail(leaf_hashes, first_index, local.size, local.root_hash, &proof.path)
                .map_err(|e| e.to_string());
        }

        let start_proof = self
            .client
            .get_inclusion_proof(local.size, leaf_hashes[0])
            .await
            .map_err(|e| e.to_string())?;
        let end_proof = self
            .client
            .get_inclusion_proof(local.size, *leaf_hashes.last().unwrap())
            .await
            .map_err(|e| e.to_string())?;

        verify_inclusion_batch(
            leaf_hashes,
            first_index,
            local.size,
            local.root_hash,
            &start_proof.path,
            &end_proof.path,
        )
        .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rand::rngs::OsRng;

    use sigsum_api::{ApiError, LogApi, Outcome};
    use sigsum_crypto::{PrivateKey, Signature};
    use sigsum_merkle::{prove_consistency, prove_inclusion, ConsistencyProof, InclusionProof, Tree};
    use sigsum_proto::{sign_leaf_message, LeafRequest, SignedTreeHead};

    use super::*;

    struct FakeLog {
        log_key: PrivateKey,
        tree: StdMutex<Tree>,
        leaves: StdMutex<Vec<Leaf>>,
        tamper_next_consistency: std::sync::atomic::AtomicBool,
    }

    impl FakeLog {
        fn new() -> (Self, PublicKey) {
            let log_key = PrivateKey::generate(&mut OsRng);
            let public_key = log_key.public_key();
            (
                Self {
                    log_key,
                    tree: StdMutex::new(Tree::new()),
                    leaves: StdMutex::new(Vec::new()),
                    tamper_next_consistency: std::sync::atomic::AtomicBool::new(false),
                },
                public_key,
            )
        }

        fn push_leaf(&self, leaf: Leaf) {
            let mut tree = self.tree.lock().unwrap();
            tree.add_leaf_hash(leaf.leaf_hash());
            self.leaves.lock().unwrap().push(leaf);
        }
    }

    #[async_trait]
    impl LogApi for FakeLog {
        async fn get_tree_head(&self) -> Result<CosignedTreeHead, ApiError> {
            let tree = self.tree.lock().unwrap();
            let origin = origin(&self.log_key.public_key().key_hash());
            let tree_head = TreeHead {
                size: tree.size(),
                root_hash: tree.root_hash(),
            };
            let sth = SignedTreeHead::sign(tree_head, &origin, &self.log_key);
            Ok(CosignedTreeHead::new(sth))
        }

        async fn get_inclusion_proof(&self, size: u64, leaf_hash: Hash) -> Result<InclusionProof, ApiError> {
            let tree = self.tree.lock().unwrap();
            let index = tree.get_leaf_index(&leaf_hash).ok_or(ApiError::NotFound)?;
            prove_inclusion(&tree, index, size).map_err(|_| ApiError::NotFound)
        }

        async fn get_consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof, ApiError> {
            if self.tamper_next_consistency.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Ok(ConsistencyProof { path: vec![Hash::sha256(b"bogus")] });
            }
            let tree = self.tree.lock().unwrap();
            prove_consistency(&tree, old_size, new_size).map_err(|_| ApiError::NotFound)
        }

        async fn get_leaves(&self, start: u64, end: u64) -> Result<Vec<Leaf>, ApiError> {
            let leaves = self.leaves.lock().unwrap();
            Ok(leaves[start as usize..end as usize].to_vec())
        }

        async fn add_leaf(&self, _request: &LeafRequest, _token: Option<(&str, &str)>) -> Result<Outcome, ApiError> {
            unimplemented!("monitor never calls add-leaf")
        }
    }

    struct Recorder {
        tree_heads: StdMutex<Vec<TreeHead>>,
        leaves: StdMutex<Vec<(u64, Vec<Leaf>)>>,
        alerts: StdMutex<Vec<Alert>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                tree_heads: StdMutex::new(Vec::new()),
                leaves: StdMutex::new(Vec::new()),
                alerts: StdMutex::new(Vec::new()),
            }
        }
    }

    impl MonitorCallbacks for Recorder {
        fn new_tree_head(&self, _log_key_hash: Hash, tree_head: TreeHead) {
            self.tree_heads.lock().unwrap().push(tree_head);
        }

        fn new_leaves(&self, _log_key_hash: Hash, start_index: u64, leaves: &[Leaf]) {
            self.leaves.lock().unwrap().push((start_index, leaves.to_vec()));
        }

        fn alert(&self, _log_key_hash: Hash, alert: Alert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    fn submit_leaf(log: &FakeLog, submitter: &PrivateKey, message: Hash) -> Leaf {
        let signature = sign_leaf_message(submitter, message.as_bytes());
        let leaf = LeafRequest::new(message, signature, submitter.public_key()).verify().unwrap();
        log.push_leaf(leaf);
        leaf
    }

    #[tokio::test]
    async fn pass_delivers_new_leaves_and_advances_resume_state() {
        let (log, log_public_key) = FakeLog::new();
        let submitter = PrivateKey::generate(&mut OsRng);
        for i in 0..3u8 {
            submit_leaf(&log, &submitter, Hash::sha256(&[i; 4]));
        }

        let dir = tempfile::tempdir().unwrap();
        let mut submit_keys = HashMap::new();
        submit_keys.insert(submitter.public_key().key_hash(), submitter.public_key());
        let callbacks = Arc::new(Recorder::new());
        let monitor = MonitorLoop::new(
            log_public_key,
            Arc::new(log),
            submit_keys,
            callbacks.clone(),
            MonitorConfig::default(),
            dir.path().to_path_buf(),
        );

        let mut local = TreeHead::empty();
        let mut resume = ResumeState {
            tree_head: CosignedTreeHead::default(),
            next_leaf_index: 0,
        };
        monitor.pass(&mut local, &mut resume).await.unwrap();

        assert_eq!(local.size, 3);
        assert_eq!(resume.next_leaf_index, 3);
        assert_eq!(callbacks.tree_heads.lock().unwrap().last().unwrap().size, 3);
        let delivered = callbacks.leaves.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 0);
        assert_eq!(delivered[0].1.len(), 3);
        assert!(callbacks.alerts.lock().unwrap().is_empty());

        let reloaded = state::load(dir.path(), &log_public_key.key_hash()).unwrap().unwrap();
        assert_eq!(reloaded.next_leaf_index, 3);
    }

    #[tokio::test]
    async fn failing_consistency_proof_surfaces_as_alert() {
        let (log, log_public_key) = FakeLog::new();
        let submitter = PrivateKey::generate(&mut OsRng);
        submit_leaf(&log, &submitter, Hash::sha256(b"first"));
        let log = Arc::new(log);

        let dir = tempfile::tempdir().unwrap();
        let monitor = MonitorLoop::new(
            log_public_key,
            log.clone() as Arc<dyn LogApi>,
            HashMap::new(),
            Arc::new(Recorder::new()),
            MonitorConfig::default(),
            dir.path().to_path_buf(),
        );

        let mut local = TreeHead::empty();
        let mut resume = ResumeState {
            tree_head: CosignedTreeHead::default(),
            next_leaf_index: 0,
        };
        monitor.pass(&mut local, &mut resume).await.unwrap();

        submit_leaf(&log, &submitter, Hash::sha256(b"second"));
        log.tamper_next_consistency.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = monitor.pass(&mut local, &mut resume).await.unwrap_err();
        assert!(matches!(err, Alert::InconsistentTreeHead));
    }

    #[tokio::test]
    async fn tampered_leaf_signature_is_skipped_and_alerted() {
        let (log, log_public_key) = FakeLog::new();
        let submitter = PrivateKey::generate(&mut OsRng);
        let message = Hash::sha256(b"tampered");
        let good_signature = sign_leaf_message(&submitter, message.as_bytes());
        let mut leaf = LeafRequest::new(message, good_signature, submitter.public_key()).verify().unwrap();
        leaf.signature = Signature::from_bytes(&[0u8; 64]).unwrap();
        log.push_leaf(leaf);

        let dir = tempfile::tempdir().unwrap();
        let mut submit_keys = HashMap::new();
        submit_keys.insert(submitter.public_key().key_hash(), submitter.public_key());
        let callbacks = Arc::new(Recorder::new());
        let monitor = MonitorLoop::new(
            log_public_key,
            Arc::new(log),
            submit_keys,
            callbacks.clone(),
            MonitorConfig::default(),
            dir.path().to_path_buf(),
        );

        let mut local = TreeHead::empty();
        let mut resume = ResumeState {
            tree_head: CosignedTreeHead::default(),
            next_leaf_index: 0,
        };
        monitor.pass(&mut local, &mut resume).await.unwrap();

        assert!(callbacks.leaves.lock().unwrap()[0].1.is_empty());
        assert!(matches!(
            callbacks.alerts.lock().unwrap().as_slice(),
            [Alert::InvalidLeafSignature { .. }]
        ));
    }
}
