use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use custody_ledger::{
    BatchRecord, BatchStatus, ChainValidator, Commit, CommitReceipt, CustodyStore,
    CustodyTimeline, IntegrityReport, ProjectionBuilder, StoreError, StoreResult,
};
use custody_types::{BatchId, IdempotencyKey, MetadataRef, PartyId};

use crate::config::MachineConfig;
use crate::error::{CustodyError, CustodyResult, Rejection};
use crate::rules::Transition;

// ---------------------------------------------------------------------------
// WriteOptions
// ---------------------------------------------------------------------------

/// Per-call options for write operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replays the original receipt if this key was already committed for
    /// the same write on the batch. Reusing it for a different write is
    /// rejected as invalid input.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Overrides the configured commit deadline.
    pub deadline: Option<Duration>,
}

impl WriteOptions {
    pub fn with_key(key: IdempotencyKey) -> Self {
        Self {
            idempotency_key: Some(key),
            deadline: None,
        }
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

// ---------------------------------------------------------------------------
// CustodyMachine
// ---------------------------------------------------------------------------

/// The custody-transfer state machine.
///
/// Every write is evaluated against the latest committed record and
/// committed with commit-if-unchanged semantics. The machine never caches
/// records between calls, so any number of instances may share a store.
pub struct CustodyMachine {
    store: Arc<dyn CustodyStore>,
    config: MachineConfig,
}

impl CustodyMachine {
    pub fn new(store: Arc<dyn CustodyStore>, config: MachineConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn CustodyStore>) -> Self {
        Self::new(store, MachineConfig::default())
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Name of the backing store.
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    // -- writes -------------------------------------------------------------

    pub async fn register(
        &self,
        batch_id: &BatchId,
        metadata_ref: &MetadataRef,
        initiator: &PartyId,
    ) -> CustodyResult<CommitReceipt> {
        let transition = Transition::Register {
            metadata_ref: metadata_ref.clone(),
        };
        self.execute(batch_id, &transition, initiator, &WriteOptions::default())
            .await
    }

    pub async fn initiate_transfer(
        &self,
        batch_id: &BatchId,
        to: &PartyId,
        initiator: &PartyId,
    ) -> CustodyResult<CommitReceipt> {
        let transition = Transition::InitiateTransfer { to: to.clone() };
        self.execute(batch_id, &transition, initiator, &WriteOptions::default())
            .await
    }

    pub async fn accept_transfer(
        &self,
        batch_id: &BatchId,
        initiator: &PartyId,
    ) -> CustodyResult<CommitReceipt> {
        self.execute(
            batch_id,
            &Transition::AcceptTransfer,
            initiator,
            &WriteOptions::default(),
        )
        .await
    }

    pub async fn report_violation(
        &self,
        batch_id: &BatchId,
        details: &str,
        initiator: &PartyId,
    ) -> CustodyResult<CommitReceipt> {
        let transition = Transition::ReportViolation {
            details: details.to_string(),
        };
        self.execute(batch_id, &transition, initiator, &WriteOptions::default())
            .await
    }

    /// Evaluate and commit a transition.
    ///
    /// On a concurrent modification the record is re-read and the rules
    /// re-evaluated, up to `max_conflict_retries` times.
    #[tracing::instrument(
        skip(self, transition, options),
        fields(kind = %transition.kind(), backend = self.store.backend())
    )]
    pub async fn execute(
        &self,
        batch_id: &BatchId,
        transition: &Transition,
        initiator: &PartyId,
        options: &WriteOptions,
    ) -> CustodyResult<CommitReceipt> {
        transition.validate_input(batch_id, initiator, options.idempotency_key.as_ref())?;

        if let Some(key) = &options.idempotency_key {
            if let Some(receipt) = self.replay(batch_id, transition, initiator, key).await? {
                return Ok(receipt);
            }
        }

        let deadline = options.deadline.unwrap_or(self.config.commit_deadline());
        let mut conflicts = 0;

        loop {
            let record = self.read(self.store.query(batch_id)).await?;
            let operation = match transition.plan(batch_id, record.as_ref(), initiator) {
                Ok(op) => op,
                Err(rejection) => {
                    tracing::info!(code = rejection.code(), "transition rejected");
                    return Err(rejection.into());
                }
            };

            let commit = Commit {
                batch_id: batch_id.clone(),
                expected_seq: record.as_ref().map_or(0, |r| r.seq),
                initiator: initiator.clone(),
                operation,
                idempotency_key: options.idempotency_key.clone(),
            };

            let outcome = tokio::time::timeout(deadline, self.store.commit(&commit)).await;
            match outcome {
                Ok(Ok(receipt)) => {
                    tracing::info!(
                        seq = receipt.seq,
                        tx = %receipt.transaction_ref.short(),
                        "custody transition committed"
                    );
                    return Ok(receipt);
                }
                Ok(Err(StoreError::Conflict { actual, .. })) => {
                    conflicts += 1;
                    if conflicts > self.config.max_conflict_retries {
                        tracing::warn!(attempts = conflicts, "conflict retries exhausted");
                        return Err(CustodyError::ConflictRetriesExhausted {
                            batch_id: batch_id.clone(),
                            attempts: conflicts,
                        });
                    }
                    tracing::debug!(
                        expected = commit.expected_seq,
                        actual,
                        attempt = conflicts,
                        "batch moved, re-evaluating"
                    );
                }
                Ok(Err(err)) => {
                    let err = CustodyError::from_store(batch_id, err);
                    tracing::warn!(error = %err, outcome = err.outcome().as_str(), "commit failed");
                    return Err(err);
                }
                Err(_) => {
                    tracing::warn!(?deadline, "commit deadline passed without confirmation");
                    return Err(CustodyError::AmbiguousCommit {
                        batch_id: batch_id.clone(),
                        reason: format!("no confirmation within {deadline:?}"),
                    });
                }
            }
        }
    }

    /// Receipt of an earlier write made with `key`, provided the recorded
    /// entry is this same transition from this same initiator.
    async fn replay(
        &self,
        batch_id: &BatchId,
        transition: &Transition,
        initiator: &PartyId,
        key: &IdempotencyKey,
    ) -> CustodyResult<Option<CommitReceipt>> {
        let Some(receipt) = self.read(self.store.find_receipt(batch_id, key)).await? else {
            return Ok(None);
        };
        let entries = self.read(self.store.history(batch_id)).await?;
        match entries.iter().find(|e| e.idempotency_key.as_ref() == Some(key)) {
            Some(entry) if transition.replays(entry, initiator) => {
                tracing::info!(seq = receipt.seq, key = %key, "idempotent write replayed");
                Ok(Some(receipt))
            }
            Some(entry) => {
                tracing::info!(seq = entry.seq, key = %key, "idempotency key reused for a different write");
                Err(Rejection::InvalidInput(format!(
                    "idempotency key {key} was already used for a different write"
                ))
                .into())
            }
            None => Err(CustodyError::Infrastructure(StoreError::Integrity(format!(
                "receipt for idempotency key {key} has no matching entry"
            )))),
        }
    }

    // -- reads --------------------------------------------------------------

    /// Latest committed state, projected for callers. A missing batch is a
    /// status with `exists = false`, not an error.
    pub async fn get_status(&self, batch_id: &BatchId) -> CustodyResult<BatchStatus> {
        let record = self.read(self.store.query(batch_id)).await?;
        Ok(ProjectionBuilder::status(batch_id, record.as_ref()))
    }

    pub async fn get_record(&self, batch_id: &BatchId) -> CustodyResult<BatchRecord> {
        self.read(self.store.query(batch_id))
            .await?
            .ok_or_else(|| Rejection::NotFound(batch_id.clone()).into())
    }

    /// Ordered custody journey of a registered batch.
    pub async fn custody_history(&self, batch_id: &BatchId) -> CustodyResult<CustodyTimeline> {
        let entries = self.read(self.store.history(batch_id)).await?;
        if entries.is_empty() {
            return Err(Rejection::NotFound(batch_id.clone()).into());
        }
        Ok(ProjectionBuilder::timeline(batch_id, &entries))
    }

    /// Replay and check a registered batch's entry stream.
    pub async fn verify(&self, batch_id: &BatchId) -> CustodyResult<IntegrityReport> {
        let entries = self.read(self.store.history(batch_id)).await?;
        if entries.is_empty() {
            return Err(Rejection::NotFound(batch_id.clone()).into());
        }
        let report = ChainValidator::validate(batch_id, &entries);
        if !report.is_valid() {
            tracing::error!(
                batch_id = %batch_id,
                issues = report.issues.len(),
                "entry stream failed verification"
            );
        }
        Ok(report)
    }

    /// Run a store read under the read deadline. Read failures never carry
    /// an unknown outcome, so they all surface as infrastructure errors.
    async fn read<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> CustodyResult<T> {
        let deadline = self.config.read_deadline();
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result.map_err(CustodyError::Infrastructure),
            Err(_) => Err(CustodyError::Infrastructure(StoreError::Timeout(deadline))),
        }
    }
}

impl std::fmt::Debug for CustodyMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyMachine")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}
