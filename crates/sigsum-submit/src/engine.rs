use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sigsum_api::LogApi;
use sigsum_crypto::Hash;
use sigsum_proto::{LeafRequest, Policy, SigsumProof};

use crate::config::SubmitConfig;
use crate::error::SubmitError;
use crate::worker::{Item, Worker, WorkerOutcome, WorkerResult};

/// Turns `LeafRequest`s into `SigsumProof`s, one worker task per log in
/// the policy, in policy order. On a worker's permanent failure an
/// in-flight item fails over to the next worker rather than failing the
/// whole submission.
pub struct SubmitEngine {
    senders: Vec<mpsc::Sender<Item>>,
    coordinator: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    token: CancellationToken,
    first_fatal: Arc<Mutex<Option<SubmitError>>>,
    timeout: std::time::Duration,
}

impl SubmitEngine {
    /// `clients` lists the logs to submit to, in policy/failover order.
    pub fn new(policy: Arc<Policy>, clients: Vec<(Hash, Arc<dyn LogApi>)>, config: SubmitConfig) -> Self {
        let token = CancellationToken::new();
        let (result_tx, mut result_rx) = mpsc::channel::<WorkerResult>(64);

        let mut senders = Vec::with_capacity(clients.len());
        let mut workers = Vec::with_capacity(clients.len());
        for (log_key_hash, client) in clients {
            let (tx, rx) = mpsc::channel::<Item>(64);
            let worker = Worker {
                log_key_hash,
                client,
                policy: policy.clone(),
                per_log_timeout: config.per_log_timeout,
                poll_delay: config.poll_delay,
            };
            let worker_token = token.clone();
            let worker_results = result_tx.clone();
            workers.push(tokio::spawn(worker.run(rx, worker_results, worker_token)));
            senders.push(tx);
        }
        drop(result_tx);

        let first_fatal = Arc::new(Mutex::new(None));
        let coordinator_senders = senders.clone();
        let coordinator_fatal = first_fatal.clone();
        let coordinator = tokio::spawn(async move {
            while let Some(WorkerResult { item, outcome }) = result_rx.recv().await {
                match outcome {
                    WorkerOutcome::Proof(proof) => {
                        let _ = item.reply.send(Ok(proof));
                    }
                    WorkerOutcome::Failed(err) => {
                        let next_index = item.worker_index + 1;
                        if next_index < coordinator_senders.len() {
                            let mut next_item = item;
                            next_item.worker_index = next_index;
                            tracing::debug!("failing over leaf submission to worker {next_index} after: {err}");
                            if coordinator_senders[next_index].send(next_item).await.is_err() {
                                continue;
                            }
                        } else {
                            let mut fatal = coordinator_fatal.lock().expect("fatal error mutex poisoned");
                            if fatal.is_none() {
                                *fatal = Some(err.clone());
                            }
                            let _ = item.reply.send(Err(if coordinator_senders.len() > 1 {
                                SubmitError::AllLogsFailed
                            } else {
                                err
                            }));
                        }
                    }
                }
            }
        });

        Self {
            senders,
            coordinator,
            workers,
            token,
            first_fatal,
            timeout: config.timeout,
        }
    }

    /// Queue one `LeafRequest`, dispatched to the first worker in policy
    /// order. Returns a handle that resolves once a `SigsumProof` is
    /// produced or the item permanently fails across every log.
    pub async fn submit(&self, request: LeafRequest) -> oneshot::Receiver<Result<SigsumProof, SubmitError>> {
        let (reply, rx) = oneshot::channel();
        let item = Item {
            request,
            reply,
            worker_index: 0,
        };
        if self.senders[0].send(item).await.is_err() {
            // Coordinator is gone; the receiver will simply never resolve,
            // mirroring a cancelled batch.
        }
        rx
    }

    /// Submit every request and wait (bounded by the batch timeout) for
    /// all of them to produce a result, in the order given.
    pub async fn submit_and_wait(&self, requests: Vec<LeafRequest>) -> Vec<Result<SigsumProof, SubmitError>> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            handles.push(self.submit(request).await);
        }
        let mut results = Vec::with_capacity(handles.len());
        let deadline = tokio::time::Instant::now() + self.timeout;
        for handle in handles {
            let result = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(SubmitError::Cancelled),
                Err(_) => Err(SubmitError::BatchTimeout),
            };
            results.push(result);
        }
        results
    }

    /// Cancel every in-flight submission and shut down the worker tasks.
    /// Returns the first fatal (all-logs-failed) error observed, if any.
    pub async fn close(self) -> Option<SubmitError> {
        self.token.cancel();
        drop(self.senders);
        for worker in self.workers {
            let _ = worker.await;
        }
        let _ = self.coordinator.await;
        self.first_fatal.lock().expect("fatal error mutex poisoned").take()
    }
}
