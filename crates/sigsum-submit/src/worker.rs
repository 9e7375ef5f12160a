//! Per-log worker: the cooperative add-leaf → tree-head → inclusion-proof
//! loop of spec.md §4.7, run as one `tokio::spawn`ed task per log.
//!
//! Grounded on `crates/server/src/services/data/log.rs`'s
//! `spawn(Input) -> Output` shape: a task owning an `mpsc::Receiver`,
//! looping with `tokio::select!` against a `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use sigsum_api::{ApiError, LogApi, Outcome};
use sigsum_crypto::Hash;
use sigsum_merkle::verify_inclusion;
use sigsum_proto::{LeafProof, LeafRequest, Policy, SigsumProof};

use crate::error::SubmitError;

/// A leaf in flight, plus where its eventual result should be delivered.
pub(crate) struct Item {
    pub(crate) request: LeafRequest,
    pub(crate) reply: oneshot::Sender<Result<SigsumProof, SubmitError>>,
    /// Index into the policy-ordered worker list of the worker that
    /// should attempt this item next. Starts at 0 and is advanced by
    /// one on every permanent failure, so the item fails over in
    /// policy order rather than retrying the same log forever.
    pub(crate) worker_index: usize,
}

/// The outcome a worker reports back to the coordinator for one item:
/// either a finished proof, or a failure that the coordinator may fail
/// over to the next worker.
pub(crate) enum WorkerOutcome {
    Proof(SigsumProof),
    Failed(SubmitError),
}

pub(crate) struct WorkerResult {
    pub(crate) item: Item,
    pub(crate) outcome: WorkerOutcome,
}

pub(crate) struct Worker {
    pub(crate) log_key_hash: Hash,
    pub(crate) client: Arc<dyn LogApi>,
    pub(crate) policy: Arc<Policy>,
    pub(crate) per_log_timeout: Duration,
    pub(crate) poll_delay: Duration,
}

impl Worker {
    pub(crate) async fn run(
        self,
        mut rx: mpsc::Receiver<Item>,
        results: mpsc::Sender<WorkerResult>,
        token: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = token.cancelled() => break,
            };
            let outcome = match tokio::time::timeout(self.per_log_timeout, self.process(&item.request, &token)).await
            {
                Ok(Ok(proof)) => WorkerOutcome::Proof(proof),
                Ok(Err(e)) => WorkerOutcome::Failed(e),
                Err(_) => WorkerOutcome::Failed(SubmitError::Timeout),
            };
            if results.send(WorkerResult { item, outcome }).await.is_err() {
                break;
            }
        }
    }

    /// Step 1-3 of spec.md §4.7: persist, then poll until the leaf is
    /// visible in a policy-satisfying tree head, then prove inclusion.
    async fn process(&self, request: &LeafRequest, token: &CancellationToken) -> Result<SigsumProof, SubmitError> {
        let leaf = request
            .verify()
            .map_err(|_| SubmitError::InvalidLeafSignature)?;
        let leaf_hash = leaf.leaf_hash();

        loop {
            match self.client.add_leaf(request, None).await {
                Ok(Outcome::Persisted) => break,
                Ok(Outcome::Accepted) => self.sleep_cancellable(token).await?,
                Err(ApiError::RateLimited) => self.sleep_cancellable(token).await?,
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            let cth = self.client.get_tree_head().await?;
            let tree_head = self
                .policy
                .verify_cosigned_tree_head(self.log_key_hash, &cth)
                .map_err(SubmitError::PolicyNotSatisfied)?;

            if tree_head.size == 0 {
                self.sleep_cancellable(token).await?;
                continue;
            }

            if tree_head.size == 1 {
                if tree_head.root_hash != leaf_hash {
                    self.sleep_cancellable(token).await?;
                    continue;
                }
                return Ok(SigsumProof {
                    log_key_hash: self.log_key_hash,
                    leaf: LeafProof {
                        signature: leaf.signature,
                        key_hash: leaf.key_hash,
                    },
                    cosigned_tree_head: cth,
                    inclusion: None,
                });
            }

            let inclusion = match self.client.get_inclusion_proof(tree_head.size, leaf_hash).await {
                Ok(proof) => proof,
                Err(ApiError::NotFound) => {
                    self.sleep_cancellable(token).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            verify_inclusion(leaf_hash, inclusion.leaf_index, tree_head.size, tree_head.root_hash, &inclusion.path)?;

            return Ok(SigsumProof {
                log_key_hash: self.log_key_hash,
                leaf: LeafProof {
                    signature: leaf.signature,
                    key_hash: leaf.key_hash,
                },
                cosigned_tree_head: cth,
                inclusion: Some(inclusion),
            });
        }
    }

    async fn sleep_cancellable(&self, token: &CancellationToken) -> Result<(), SubmitError> {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_delay) => Ok(()),
            _ = token.cancelled() => Err(SubmitError::Cancelled),
        }
    }
}
