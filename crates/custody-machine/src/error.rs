use custody_ledger::StoreError;
use custody_types::{BatchId, PartyId, TypeError};

/// Business-rule rejection of a requested transition.
///
/// Rejections are deterministic given the current record: retrying the
/// same request against the same state yields the same rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("batch {0} is already registered")]
    AlreadyExists(BatchId),

    #[error("batch {0} not found")]
    NotFound(BatchId),

    #[error("{initiator} is not the current owner of {batch_id}")]
    NotOwner { batch_id: BatchId, initiator: PartyId },

    #[error("{initiator} is not the designated recipient of {batch_id}")]
    NotDesignatedRecipient { batch_id: BatchId, initiator: PartyId },

    #[error("batch {batch_id} already has a transfer pending to {pending_owner}")]
    TransferAlreadyPending {
        batch_id: BatchId,
        pending_owner: PartyId,
    },

    #[error("batch {0} has no pending transfer")]
    NoPendingTransfer(BatchId),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Rejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::NotOwner { .. } => "not_owner",
            Self::NotDesignatedRecipient { .. } => "not_designated_recipient",
            Self::TransferAlreadyPending { .. } => "transfer_already_pending",
            Self::NoPendingTransfer(_) => "no_pending_transfer",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<TypeError> for Rejection {
    fn from(err: TypeError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// What a caller may assume about ledger state after an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The transition was refused; nothing was committed.
    Rejected,
    /// The ledger did not apply anything.
    NotApplied,
    /// The commit may or may not have landed. Re-query before retrying.
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::NotApplied => "not_applied",
            Self::Unknown => "unknown",
        }
    }
}

/// Errors produced by the custody state machine.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("ledger failure: {0}")]
    Infrastructure(StoreError),

    #[error("commit outcome unknown for {batch_id}: {reason}")]
    AmbiguousCommit { batch_id: BatchId, reason: String },

    #[error("gave up on {batch_id} after {attempts} concurrent modifications")]
    ConflictRetriesExhausted { batch_id: BatchId, attempts: u32 },
}

impl CustodyError {
    /// Classify a store failure. Unknown commit outcomes never collapse
    /// into plain infrastructure errors.
    pub fn from_store(batch_id: &BatchId, err: StoreError) -> Self {
        if let StoreError::IdempotencyMismatch { .. } = err {
            return Self::Rejected(Rejection::InvalidInput(err.to_string()));
        }
        if err.is_outcome_unknown() {
            return Self::AmbiguousCommit {
                batch_id: batch_id.clone(),
                reason: err.to_string(),
            };
        }
        Self::Infrastructure(err)
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Rejected(_) => Outcome::Rejected,
            Self::Infrastructure(_) | Self::ConflictRetriesExhausted { .. } => Outcome::NotApplied,
            Self::AmbiguousCommit { .. } => Outcome::Unknown,
        }
    }

    /// Whether a caller may retry. Rejections are never retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(r) => r.code(),
            Self::Infrastructure(_) => "ledger_unavailable",
            Self::AmbiguousCommit { .. } => "commit_outcome_unknown",
            Self::ConflictRetriesExhausted { .. } => "concurrent_modification",
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// Result alias for state machine operations.
pub type CustodyResult<T> = Result<T, CustodyError>;
