use std::time::Duration;

use custody_types::BatchId;

/// Errors produced by a [`CustodyStore`](crate::CustodyStore).
///
/// None of these are business-rule rejections. They describe whether the
/// backing ledger applied a commit, refused it, or left the outcome unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Commit-if-unchanged precondition failed: the batch moved on.
    #[error("commit conflict on {batch_id}: expected seq {expected}, found {actual}")]
    Conflict {
        batch_id: BatchId,
        expected: u64,
        actual: u64,
    },

    /// The ledger could not be reached; nothing was applied.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A read did not complete in time.
    #[error("ledger request timed out after {0:?}")]
    Timeout(Duration),

    /// A commit was dispatched but never confirmed.
    #[error("commit outcome unknown: {0}")]
    Ambiguous(String),

    /// The ledger answered with something that does not decode.
    #[error("malformed ledger response: {0}")]
    Malformed(String),

    /// The ledger refused the request outright.
    #[error("ledger refused request ({status}): {message}")]
    Refused { status: u16, message: String },

    /// An idempotency key was replayed with a different commit.
    #[error("idempotency key {key} already used for a different commit on {batch_id}")]
    IdempotencyMismatch { batch_id: BatchId, key: String },

    /// Stored entries do not fold into a consistent record.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns `true` when a commit may or may not have been applied.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }

    /// Returns `true` for transient failures worth retrying upstream.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Unavailable(_) | Self::Timeout(_) | Self::Ambiguous(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
