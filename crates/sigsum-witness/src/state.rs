//! `WitnessState`: the single-log witness state machine.
//!
//! Grounded on `crates/client-storage/src/storage.rs`'s tempfile-then-
//! rename persistence (`NamedTempFile::new_in`, `into_temp_path`,
//! `TempPath::persist`) and on `crates/server/src/services/transparency/
//! sign.rs`'s pattern of a single mutex guarding both the in-memory state
//! and the step that durably commits it, so a reader never observes the
//! in-memory tree head and the on-disk file disagree.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use sigsum_api::WitnessAddTreeHead;
use sigsum_crypto::{Hash, PrivateKey, PublicKey, Signer};
use sigsum_merkle::verify_consistency;
use sigsum_proto::tree_head::{origin, Cosignature, CosignedTreeHead, TreeHead};

use crate::error::WitnessError;

struct Inner {
    current: TreeHead,
}

/// A witness's durable cosigning state for a single configured log.
///
/// Holds the log's public key (to verify proposed tree heads), the
/// witness's own signing key (to cosign them), and the path of the file
/// that persists the latest cosigned tree head. `add_tree_head` is the
/// only mutator and holds the lock for its entire critical section,
/// including the atomic file replace, so a crash mid-update can never
/// leave the in-memory and on-disk views out of sync.
pub struct WitnessState {
    key_hash: Hash,
    log_public_key: PublicKey,
    signer: PrivateKey,
    file_path: PathBuf,
    inner: Mutex<Inner>,
}

impl WitnessState {
    /// Load persisted state from `file_path`, or initialize to the empty
    /// tree if no file exists yet. Refuses to start if a file exists but
    /// its log signature or this witness's own cosignature fails to
    /// verify, since that indicates on-disk corruption or a key
    /// mismatch this witness must not paper over.
    pub fn open(file_path: PathBuf, log_public_key: PublicKey, signer: PrivateKey) -> Result<Self, WitnessError> {
        let key_hash = log_public_key.key_hash();
        let witness_key_hash = signer.public_key().key_hash();
        let origin = origin(&key_hash);

        let current = if file_path.is_file() {
            let text = fs::read_to_string(&file_path)?;
            let cth = CosignedTreeHead::from_ascii(&text)
                .map_err(|e| WitnessError::InvalidPersistedState(e.to_string()))?;
            let sth = cth
                .signed_tree_head
                .as_ref()
                .ok_or_else(|| WitnessError::InvalidPersistedState("missing signed tree head".into()))?;
            sth.verify(&origin, &log_public_key)
                .map_err(|e| WitnessError::InvalidPersistedState(e.to_string()))?;
            let (_, own_cosignature) = cth
                .cosignatures()
                .iter()
                .find(|(k, _)| *k == witness_key_hash)
                .ok_or_else(|| WitnessError::InvalidPersistedState("missing our own cosignature".into()))?;
            own_cosignature
                .verify(&signer.public_key(), &origin, &sth.tree_head)
                .map_err(|e| WitnessError::InvalidPersistedState(e.to_string()))?;
            sth.tree_head
        } else {
            TreeHead::empty()
        };

        Ok(Self {
            key_hash,
            log_public_key,
            signer,
            file_path,
            inner: Mutex::new(Inner { current }),
        })
    }

    /// The configured log's key-hash.
    pub fn key_hash(&self) -> Hash {
        self.key_hash
    }

    /// Process an `add-tree-head` request, following the witness
    /// precondition table: wrong log, bad log signature, a stale or
    /// downgraded `old_size`, and a failing consistency proof are all
    /// rejected before anything is mutated or persisted.
    pub async fn add_tree_head(&self, request: &WitnessAddTreeHead) -> Result<Cosignature, WitnessError> {
        if request.key_hash != self.key_hash {
            return Err(WitnessError::NotFound);
        }
        let origin = origin(&self.key_hash);
        request
            .proposed
            .verify(&origin, &self.log_public_key)
            .map_err(|_| WitnessError::Forbidden)?;

        let mut inner = self.inner.lock().await;

        if request.old_size != inner.current.size || request.proposed.tree_head.size < inner.current.size {
            return Err(WitnessError::Conflict {
                current_size: inner.current.size,
            });
        }

        if request.proposed.tree_head.size > inner.current.size {
            verify_consistency(
                inner.current.size,
                request.proposed.tree_head.size,
                inner.current.root_hash,
                request.proposed.tree_head.root_hash,
                &request.consistency_proof.path,
            )
            .map_err(|_| WitnessError::UnprocessableEntity)?;
        } else if request.proposed.tree_head.root_hash != inner.current.root_hash {
            return Err(WitnessError::UnprocessableEntity);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs();
        let cosignature = Cosignature::cosign(&request.proposed.tree_head, &origin, timestamp, &self.signer);

        let mut cth = CosignedTreeHead::new(request.proposed.clone());
        cth.add_cosignature(self.signer.public_key().key_hash(), cosignature);
        self.persist(&cth)?;

        inner.current = request.proposed.tree_head;
        Ok(cosignature)
    }

    /// Write `cth` to `file_path` via a same-directory tempfile and
    /// atomic rename, so a crash mid-write never corrupts the previous
    /// state.
    fn persist(&self, cth: &CosignedTreeHead) -> Result<(), WitnessError> {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        fs::write(tmp.path(), cth.to_ascii())?;
        tmp.persist(&self.file_path).map_err(|e| e.error)?;
        Ok(())
    }
}
