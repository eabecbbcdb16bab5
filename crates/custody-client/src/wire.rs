//! JSON bodies exchanged with the ledger service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use custody_ledger::{CommitReceipt, Operation};
use custody_types::{BatchId, PartyId, TransactionRef};

/// `POST /v1/commits` body. The idempotency key travels as a header.
#[derive(Debug, Serialize)]
pub struct CommitRequest<'a> {
    pub batch_id: &'a BatchId,
    pub expected_seq: u64,
    pub initiator: &'a PartyId,
    pub operation: &'a Operation,
}

/// Confirmation returned for an applied commit or a stored receipt.
#[derive(Debug, Serialize, Deserialize)]
pub struct Confirmation {
    pub transaction_ref: TransactionRef,
    pub confirmed_at: DateTime<Utc>,
    pub seq: u64,
}

impl Confirmation {
    pub fn into_receipt(self, batch_id: &BatchId) -> CommitReceipt {
        CommitReceipt {
            batch_id: batch_id.clone(),
            seq: self.seq,
            transaction_ref: self.transaction_ref,
            confirmed_at: self.confirmed_at,
        }
    }
}

/// Body of a `409 Conflict` answer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConflictBody {
    pub actual_seq: u64,
}
