use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use custody_types::{BatchId, MetadataRef, PartyId, TransactionRef};

use crate::records::{BatchRecord, LedgerEntry, Operation, OperationKind};

/// Custody state of a batch as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyState {
    Unregistered,
    Registered,
    TransferPending,
}

impl fmt::Display for CustodyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::TransferPending => "transfer_pending",
        })
    }
}

/// Caller-facing status view of a batch.
///
/// Every optional field is `None` when the backing state does not carry
/// it; nothing is filled with placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub exists: bool,
    pub state: CustodyState,
    pub owner: Option<PartyId>,
    pub pending_owner: Option<PartyId>,
    pub handover_pending: bool,
    pub metadata_ref: Option<MetadataRef>,
    pub violation: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Confirmation time of the commit that produced the current state.
    pub notarized_at: Option<DateTime<Utc>>,
    /// Transaction reference of that commit.
    pub proof_ref: Option<TransactionRef>,
}

/// One step in a batch's custody journey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub seq: u64,
    pub kind: OperationKind,
    pub actor: PartyId,
    pub summary: String,
    pub at: DateTime<Utc>,
    pub transaction_ref: TransactionRef,
}

/// Ordered custody journey of a batch, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyTimeline {
    pub batch_id: BatchId,
    pub entries: Vec<TimelineEntry>,
}

/// Deterministic projection builders.
pub struct ProjectionBuilder;

impl ProjectionBuilder {
    pub fn status(batch_id: &BatchId, record: Option<&BatchRecord>) -> BatchStatus {
        let Some(record) = record else {
            return BatchStatus {
                batch_id: batch_id.clone(),
                exists: false,
                state: CustodyState::Unregistered,
                owner: None,
                pending_owner: None,
                handover_pending: false,
                metadata_ref: None,
                violation: None,
                created_at: None,
                notarized_at: None,
                proof_ref: None,
            };
        };

        let state = if record.has_pending_transfer() {
            CustodyState::TransferPending
        } else {
            CustodyState::Registered
        };

        BatchStatus {
            batch_id: record.id.clone(),
            exists: true,
            state,
            owner: Some(record.owner.clone()),
            pending_owner: record.pending_owner.clone(),
            handover_pending: record.has_pending_transfer(),
            metadata_ref: Some(record.metadata_ref.clone()),
            violation: record.violation.clone(),
            created_at: Some(record.created_at),
            notarized_at: record.last_transaction.as_ref().map(|n| n.confirmed_at),
            proof_ref: record
                .last_transaction
                .as_ref()
                .map(|n| n.transaction_ref.clone()),
        }
    }

    pub fn timeline(batch_id: &BatchId, entries: &[LedgerEntry]) -> CustodyTimeline {
        let entries = entries
            .iter()
            .map(|entry| TimelineEntry {
                seq: entry.seq,
                kind: entry.operation.kind(),
                actor: entry.initiator.clone(),
                summary: summarize(&entry.operation),
                at: entry.confirmed_at,
                transaction_ref: entry.transaction_ref.clone(),
            })
            .collect();

        CustodyTimeline {
            batch_id: batch_id.clone(),
            entries,
        }
    }
}

fn summarize(operation: &Operation) -> String {
    match operation {
        Operation::Register { metadata_ref } => format!("registered with {metadata_ref}"),
        Operation::InitiateTransfer { from, to } => format!("handoff offered {from} -> {to}"),
        Operation::AcceptTransfer { from, to } => format!("custody passed {from} -> {to}"),
        Operation::ReportViolation { details } => format!("violation reported: {details}"),
    }
}
