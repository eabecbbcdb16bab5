use chrono::{DateTime, Utc};
use serde::Serialize;

use custody_types::{BatchId, IdempotencyKey, PartyId, TransactionRef};

use crate::error::{StoreError, StoreResult};
use crate::records::{Commit, LedgerEntry, Operation};

/// Domain tag prepended to every entry hash.
pub const ENTRY_DOMAIN: &str = "custody-entry-v1";

/// The hashed portion of an entry. Excludes `entry_hash` and the
/// transaction reference derived from it.
#[derive(Serialize)]
struct HashedFields<'a> {
    batch_id: &'a BatchId,
    seq: u64,
    initiator: &'a PartyId,
    operation: &'a Operation,
    confirmed_at: &'a DateTime<Utc>,
    idempotency_key: Option<&'a IdempotencyKey>,
    prev_hash: Option<[u8; 32]>,
}

/// Domain-separated BLAKE3 hash of an entry's content.
pub fn entry_hash(entry: &LedgerEntry) -> StoreResult<[u8; 32]> {
    let fields = HashedFields {
        batch_id: &entry.batch_id,
        seq: entry.seq,
        initiator: &entry.initiator,
        operation: &entry.operation,
        confirmed_at: &entry.confirmed_at,
        idempotency_key: entry.idempotency_key.as_ref(),
        prev_hash: entry.prev_hash,
    };
    let encoded =
        serde_json::to_vec(&fields).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(ENTRY_DOMAIN.as_bytes());
    hasher.update(b":");
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

/// Seal a commit into the next entry of a stream.
///
/// `previous` is the current head of the stream, if any. The confirmation
/// time never runs backwards relative to the head.
pub fn seal(commit: &Commit, previous: Option<&LedgerEntry>) -> StoreResult<LedgerEntry> {
    let seq = previous.map(|p| p.seq + 1).unwrap_or(1);
    let confirmed_at = next_timestamp(previous);

    let mut entry = LedgerEntry {
        batch_id: commit.batch_id.clone(),
        seq,
        initiator: commit.initiator.clone(),
        operation: commit.operation.clone(),
        confirmed_at,
        idempotency_key: commit.idempotency_key.clone(),
        prev_hash: previous.map(|p| p.entry_hash),
        entry_hash: [0; 32],
        transaction_ref: TransactionRef::new(String::new()),
    };
    entry.entry_hash = entry_hash(&entry)?;
    entry.transaction_ref = TransactionRef::from_hash(entry.entry_hash);
    Ok(entry)
}

fn next_timestamp(previous: Option<&LedgerEntry>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev.confirmed_at > now => prev.confirmed_at,
        _ => now,
    }
}
