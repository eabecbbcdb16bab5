use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use custody_types::{BatchId, IdempotencyKey, MetadataRef, PartyId, TransactionRef};

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// A state transition approved by the custody state machine.
///
/// Transfer variants name both parties so every entry is self-describing
/// and the fold can check it against the record it lands on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Register { metadata_ref: MetadataRef },
    InitiateTransfer { from: PartyId, to: PartyId },
    AcceptTransfer { from: PartyId, to: PartyId },
    ReportViolation { details: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Register { .. } => OperationKind::Register,
            Self::InitiateTransfer { .. } => OperationKind::InitiateTransfer,
            Self::AcceptTransfer { .. } => OperationKind::AcceptTransfer,
            Self::ReportViolation { .. } => OperationKind::ReportViolation,
        }
    }
}

/// Discriminant of [`Operation`], used for logging and timelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Register,
    InitiateTransfer,
    AcceptTransfer,
    ReportViolation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::InitiateTransfer => "initiate_transfer",
            Self::AcceptTransfer => "accept_transfer",
            Self::ReportViolation => "report_violation",
        })
    }
}

// ---------------------------------------------------------------------------
// Commit / receipt
// ---------------------------------------------------------------------------

/// A commit request sent to a store.
///
/// `expected_seq` is the record's `seq` the transition was evaluated
/// against (0 for an unregistered batch). Stores apply the commit only if
/// the batch is still at that sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub batch_id: BatchId,
    pub expected_seq: u64,
    pub initiator: PartyId,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Confirmation of a durable commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub batch_id: BatchId,
    pub seq: u64,
    pub transaction_ref: TransactionRef,
    pub confirmed_at: DateTime<Utc>,
}

impl CommitReceipt {
    pub fn notarization(&self) -> Notarization {
        Notarization {
            transaction_ref: self.transaction_ref.clone(),
            confirmed_at: self.confirmed_at,
        }
    }
}

/// Proof that a state was committed to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notarization {
    pub transaction_ref: TransactionRef,
    pub confirmed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

/// One confirmed, hash-linked entry in a batch's stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub batch_id: BatchId,
    /// 1-based position in the batch stream.
    pub seq: u64,
    pub initiator: PartyId,
    pub operation: Operation,
    pub confirmed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    pub prev_hash: Option<[u8; 32]>,
    pub entry_hash: [u8; 32],
    pub transaction_ref: TransactionRef,
}

impl LedgerEntry {
    pub fn receipt(&self) -> CommitReceipt {
        CommitReceipt {
            batch_id: self.batch_id.clone(),
            seq: self.seq,
            transaction_ref: self.transaction_ref.clone(),
            confirmed_at: self.confirmed_at,
        }
    }

    /// Whether this entry records the same logical write as `commit`.
    pub fn matches(&self, commit: &Commit) -> bool {
        self.batch_id == commit.batch_id
            && self.initiator == commit.initiator
            && self.operation == commit.operation
    }
}

// ---------------------------------------------------------------------------
// Batch record
// ---------------------------------------------------------------------------

/// Current custody state of a registered batch.
///
/// Records only exist for registered batches; absence is modelled as
/// `Option<BatchRecord>` at the store boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    pub owner: PartyId,
    pub pending_owner: Option<PartyId>,
    pub metadata_ref: MetadataRef,
    pub violation: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Number of confirmed entries folded into this record.
    pub seq: u64,
    /// Most recent confirmed commit, if the backing ledger reports one.
    #[serde(default)]
    pub last_transaction: Option<Notarization>,
}

impl BatchRecord {
    /// Fold an entry stream into a record. An empty stream yields `None`.
    pub fn fold(entries: &[LedgerEntry]) -> StoreResult<Option<Self>> {
        let mut record: Option<Self> = None;
        for entry in entries {
            match record.as_mut() {
                None => record = Some(Self::genesis(entry)?),
                Some(current) => current.apply(entry)?,
            }
        }
        Ok(record)
    }

    /// Build a record from its registration entry.
    pub fn genesis(entry: &LedgerEntry) -> StoreResult<Self> {
        let Operation::Register { metadata_ref } = &entry.operation else {
            return Err(integrity(entry, "stream does not start with a registration"));
        };
        if entry.seq != 1 {
            return Err(integrity(entry, "registration must be the first entry"));
        }
        Ok(Self {
            id: entry.batch_id.clone(),
            owner: entry.initiator.clone(),
            pending_owner: None,
            metadata_ref: metadata_ref.clone(),
            violation: None,
            created_at: entry.confirmed_at,
            seq: entry.seq,
            last_transaction: Some(Notarization {
                transaction_ref: entry.transaction_ref.clone(),
                confirmed_at: entry.confirmed_at,
            }),
        })
    }

    /// Apply the effect of a subsequent entry.
    ///
    /// Only effects are applied here; authorization was decided before the
    /// commit. An entry that cannot apply to this record means the stream
    /// is corrupt, and the record is left untouched.
    pub fn apply(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        if entry.batch_id != self.id {
            return Err(integrity(entry, "entry belongs to another batch"));
        }
        if entry.seq != self.seq + 1 {
            return Err(integrity(
                entry,
                &format!("expected seq {}, found {}", self.seq + 1, entry.seq),
            ));
        }

        match &entry.operation {
            Operation::Register { .. } => {
                return Err(integrity(entry, "batch registered twice"));
            }
            Operation::InitiateTransfer { from, to } => {
                if self.pending_owner.is_some() {
                    return Err(integrity(entry, "overlapping transfer"));
                }
                if *from != self.owner {
                    return Err(integrity(entry, "transfer initiated by non-owner"));
                }
                self.pending_owner = Some(to.clone());
            }
            Operation::AcceptTransfer { from, to } => {
                if self.pending_owner.as_ref() != Some(to) || *from != self.owner {
                    return Err(integrity(entry, "acceptance does not match pending transfer"));
                }
                self.owner = to.clone();
                self.pending_owner = None;
            }
            Operation::ReportViolation { details } => {
                self.violation = Some(details.clone());
            }
        }

        self.seq = entry.seq;
        self.last_transaction = Some(Notarization {
            transaction_ref: entry.transaction_ref.clone(),
            confirmed_at: entry.confirmed_at,
        });
        Ok(())
    }

    pub fn has_pending_transfer(&self) -> bool {
        self.pending_owner.is_some()
    }
}

fn integrity(entry: &LedgerEntry, reason: &str) -> StoreError {
    StoreError::Integrity(format!("{} seq {}: {reason}", entry.batch_id, entry.seq))
}
