use async_trait::async_trait;

use custody_types::{BatchId, IdempotencyKey};

use crate::error::StoreResult;
use crate::records::{BatchRecord, Commit, CommitReceipt, LedgerEntry};

/// Commit/query boundary between the custody state machine and whatever
/// holds custody state durably.
///
/// Implementations must satisfy these invariants:
/// - `commit` applies only if the batch is still at `commit.expected_seq`;
///   otherwise it returns `StoreError::Conflict` and changes nothing.
/// - A commit carrying an idempotency key already recorded for the batch
///   returns the original receipt and appends nothing.
/// - Reads only ever observe confirmed commits.
/// - Records are never deleted.
/// - Implementations never retry; the caller owns retry policy.
#[async_trait]
pub trait CustodyStore: Send + Sync {
    /// Short name of the backing store, for diagnostics.
    fn backend(&self) -> &'static str;

    /// Durably append a state transition.
    async fn commit(&self, commit: &Commit) -> StoreResult<CommitReceipt>;

    /// Current record for a batch, or `None` if it was never registered.
    async fn query(&self, batch_id: &BatchId) -> StoreResult<Option<BatchRecord>>;

    /// Confirmed entries for a batch, oldest first.
    async fn history(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>>;

    /// Receipt of an earlier commit made with `key`, if one was recorded.
    async fn find_receipt(
        &self,
        batch_id: &BatchId,
        key: &IdempotencyKey,
    ) -> StoreResult<Option<CommitReceipt>>;
}
