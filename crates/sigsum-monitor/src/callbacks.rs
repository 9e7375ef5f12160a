use sigsum_crypto::Hash;
use sigsum_proto::{tree_head::TreeHead, Leaf};

use crate::error::Alert;

/// What a monitored log delivers back to its caller. All methods have a
/// no-op default so a caller only overrides the ones it cares about.
pub trait MonitorCallbacks: Send + Sync {
    /// The local tree head advanced to a new, consistency-verified size.
    fn new_tree_head(&self, _log_key_hash: Hash, _tree_head: TreeHead) {}

    /// A page of leaves starting at `start_index` was fetched and proven
    /// included; leaves that failed signature verification have already
    /// been filtered out and reported via `alert`.
    fn new_leaves(&self, _log_key_hash: Hash, _start_index: u64, _leaves: &[Leaf]) {}

    /// A non-fatal problem occurred during one pass; the loop continues.
    fn alert(&self, _log_key_hash: Hash, _alert: Alert) {}
}
