use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use custody_types::{BatchId, IdempotencyKey};

use crate::chain;
use crate::error::{StoreError, StoreResult};
use crate::records::{BatchRecord, Commit, CommitReceipt, LedgerEntry};
use crate::traits::CustodyStore;
use crate::validation::{ChainValidator, IntegrityReport};

/// In-process fallback store used when no ledger endpoint is configured.
///
/// Holds one hash-chained entry stream per batch for the lifetime of the
/// value. Each stream sits behind its own mutex, so commit-if-unchanged is
/// atomic per batch while unrelated batches proceed in parallel. Reads
/// clone under the lock and never observe a half-applied commit.
pub struct InMemoryStore {
    streams: RwLock<HashMap<BatchId, Arc<Mutex<BatchStream>>>>,
}

#[derive(Default)]
struct BatchStream {
    entries: Vec<LedgerEntry>,
    record: Option<BatchRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        tracing::warn!("custody store is in-memory; all state is lost when the process exits");
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registered batches.
    pub fn batch_count(&self) -> StoreResult<usize> {
        let streams = self.streams.read().map_err(|_| poisoned("batch table"))?;
        Ok(streams.len())
    }

    /// Validate the hash chain and fold of a batch stream.
    pub fn validate_stream(&self, batch_id: &BatchId) -> StoreResult<IntegrityReport> {
        let entries = self.read_entries(batch_id)?;
        Ok(ChainValidator::validate(batch_id, &entries))
    }

    fn stream(&self, batch_id: &BatchId) -> StoreResult<Option<Arc<Mutex<BatchStream>>>> {
        let streams = self.streams.read().map_err(|_| poisoned("batch table"))?;
        Ok(streams.get(batch_id).cloned())
    }

    fn read_entries(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>> {
        let Some(stream) = self.stream(batch_id)? else {
            return Ok(Vec::new());
        };
        let stream = stream.lock().map_err(|_| poisoned("batch stream"))?;
        Ok(stream.entries.clone())
    }

    /// Streams enter the table only once their first entry is sealed, so
    /// failed commits leave no trace.
    fn commit_locked(&self, commit: &Commit) -> StoreResult<CommitReceipt> {
        if let Some(stream) = self.stream(&commit.batch_id)? {
            let mut stream = stream.lock().map_err(|_| poisoned("batch stream"))?;
            return stream.append(commit);
        }
        if commit.expected_seq != 0 {
            return Err(StoreError::Conflict {
                batch_id: commit.batch_id.clone(),
                expected: commit.expected_seq,
                actual: 0,
            });
        }

        let mut fresh = BatchStream::default();
        let receipt = fresh.append(commit)?;

        let existing = {
            let mut streams = self.streams.write().map_err(|_| poisoned("batch table"))?;
            match streams.entry(commit.batch_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(Mutex::new(fresh)));
                    return Ok(receipt);
                }
                Entry::Occupied(slot) => Arc::clone(slot.get()),
            }
        };
        // Another writer created the batch first; apply against its stream.
        let mut stream = existing.lock().map_err(|_| poisoned("batch stream"))?;
        stream.append(commit)
    }
}

impl BatchStream {
    fn append(&mut self, commit: &Commit) -> StoreResult<CommitReceipt> {
        if let Some(key) = &commit.idempotency_key {
            if let Some(existing) = find_keyed(&self.entries, key) {
                if !existing.matches(commit) {
                    return Err(StoreError::IdempotencyMismatch {
                        batch_id: commit.batch_id.clone(),
                        key: key.to_string(),
                    });
                }
                tracing::debug!(
                    batch_id = %commit.batch_id,
                    seq = existing.seq,
                    "idempotent commit replayed"
                );
                return Ok(existing.receipt());
            }
        }

        let actual = self.entries.len() as u64;
        if commit.expected_seq != actual {
            return Err(StoreError::Conflict {
                batch_id: commit.batch_id.clone(),
                expected: commit.expected_seq,
                actual,
            });
        }

        let entry = chain::seal(commit, self.entries.last())?;
        let next = match self.record.clone() {
            None => BatchRecord::genesis(&entry)?,
            Some(mut record) => {
                record.apply(&entry)?;
                record
            }
        };

        let receipt = entry.receipt();
        self.entries.push(entry);
        self.record = Some(next);

        tracing::debug!(
            batch_id = %commit.batch_id,
            seq = receipt.seq,
            kind = %commit.operation.kind(),
            tx = %receipt.transaction_ref.short(),
            "entry sealed"
        );
        Ok(receipt)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.streams.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("stream_count", &count)
            .finish()
    }
}

#[async_trait]
impl CustodyStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn commit(&self, commit: &Commit) -> StoreResult<CommitReceipt> {
        self.commit_locked(commit)
    }

    async fn query(&self, batch_id: &BatchId) -> StoreResult<Option<BatchRecord>> {
        let Some(stream) = self.stream(batch_id)? else {
            return Ok(None);
        };
        let stream = stream.lock().map_err(|_| poisoned("batch stream"))?;
        Ok(stream.record.clone())
    }

    async fn history(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>> {
        self.read_entries(batch_id)
    }

    async fn find_receipt(
        &self,
        batch_id: &BatchId,
        key: &IdempotencyKey,
    ) -> StoreResult<Option<CommitReceipt>> {
        let entries = self.read_entries(batch_id)?;
        Ok(find_keyed(&entries, key).map(LedgerEntry::receipt))
    }
}

fn find_keyed<'a>(entries: &'a [LedgerEntry], key: &IdempotencyKey) -> Option<&'a LedgerEntry> {
    entries
        .iter()
        .find(|e| e.idempotency_key.as_ref() == Some(key))
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Integrity(format!("{what} lock poisoned"))
}
