//! Custody-transfer state machine.
//!
//! Every custody write goes through [`CustodyMachine`]: the request is
//! validated, checked against the latest committed [`BatchRecord`] and the
//! operation's [`Authorization`] rule, and committed to a
//! [`CustodyStore`](custody_ledger::CustodyStore) only if the batch has not
//! moved in the meantime.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use custody_ledger::InMemoryStore;
//! use custody_machine::CustodyMachine;
//! use custody_types::{BatchId, MetadataRef, PartyId};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let machine = CustodyMachine::with_defaults(Arc::new(InMemoryStore::new()));
//!     let batch = BatchId::from("batch-1");
//!     let mfg = PartyId::from("mfg-addr");
//!     machine
//!         .register(&batch, &MetadataRef::from("ipfs://abc"), &mfg)
//!         .await
//!         .unwrap();
//!     let status = machine.get_status(&batch).await.unwrap();
//!     assert_eq!(status.owner, Some(mfg));
//! });
//! ```
//!
//! [`BatchRecord`]: custody_ledger::BatchRecord

pub mod config;
pub mod error;
pub mod machine;
pub mod rules;

#[cfg(test)]
mod properties;

pub use config::MachineConfig;
pub use error::{CustodyError, CustodyResult, Outcome, Rejection};
pub use machine::{CustodyMachine, WriteOptions};
pub use rules::{Authorization, Transition};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use custody_ledger::{
        BatchRecord, Commit, CommitReceipt, CustodyState, CustodyStore, InMemoryStore,
        LedgerEntry, Operation, StoreError, StoreResult,
    };
    use custody_types::{BatchId, IdempotencyKey, MetadataRef, PartyId};

    fn batch() -> BatchId {
        BatchId::from("batch-1")
    }

    fn mfg() -> PartyId {
        PartyId::from("mfg-addr")
    }

    fn log() -> PartyId {
        PartyId::from("log-addr")
    }

    fn ret() -> PartyId {
        PartyId::from("ret-addr")
    }

    fn machine() -> CustodyMachine {
        CustodyMachine::with_defaults(Arc::new(InMemoryStore::new()))
    }

    async fn registered() -> CustodyMachine {
        let m = machine();
        m.register(&batch(), &MetadataRef::from("ipfs://abc"), &mfg())
            .await
            .unwrap();
        m
    }

    fn rejection(err: CustodyError) -> Rejection {
        match err {
            CustodyError::Rejected(r) => r,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Wraps an in-memory store and misbehaves on commit.
    struct FaultyStore {
        inner: InMemoryStore,
        commit_error: Option<StoreError>,
        commit_delay: Option<Duration>,
        read_delay: Option<Duration>,
        commits: AtomicU32,
    }

    impl FaultyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                commit_error: None,
                commit_delay: None,
                read_delay: None,
                commits: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CustodyStore for FaultyStore {
        fn backend(&self) -> &'static str {
            "faulty"
        }

        async fn commit(&self, commit: &Commit) -> StoreResult<CommitReceipt> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.commit_delay {
                tokio::time::sleep(delay).await;
            }
            match &self.commit_error {
                Some(err) => Err(err.clone()),
                None => self.inner.commit(commit).await,
            }
        }

        async fn query(&self, batch_id: &BatchId) -> StoreResult<Option<BatchRecord>> {
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.query(batch_id).await
        }

        async fn history(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>> {
            self.inner.history(batch_id).await
        }

        async fn find_receipt(
            &self,
            batch_id: &BatchId,
            key: &IdempotencyKey,
        ) -> StoreResult<Option<CommitReceipt>> {
            self.inner.find_receipt(batch_id, key).await
        }
    }

    /// Lets a competing commit land just before the first commit it sees.
    struct RacingStore {
        inner: InMemoryStore,
        competitor: Commit,
        raced: AtomicBool,
    }

    #[async_trait]
    impl CustodyStore for RacingStore {
        fn backend(&self) -> &'static str {
            "racing"
        }

        async fn commit(&self, commit: &Commit) -> StoreResult<CommitReceipt> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.commit(&self.competitor).await?;
            }
            self.inner.commit(commit).await
        }

        async fn query(&self, batch_id: &BatchId) -> StoreResult<Option<BatchRecord>> {
            self.inner.query(batch_id).await
        }

        async fn history(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>> {
            self.inner.history(batch_id).await
        }

        async fn find_receipt(
            &self,
            batch_id: &BatchId,
            key: &IdempotencyKey,
        ) -> StoreResult<Option<CommitReceipt>> {
            self.inner.find_receipt(batch_id, key).await
        }
    }

    // -----------------------------------------------------------------------
    // 1. Register, hand off, accept
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn two_phase_handoff_scenario() {
        let m = registered().await;
        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.owner, Some(mfg()));
        assert_eq!(status.pending_owner, None);
        assert_eq!(status.state, CustodyState::Registered);

        m.initiate_transfer(&batch(), &log(), &mfg()).await.unwrap();
        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.pending_owner, Some(log()));
        assert!(status.handover_pending);

        let err = m.accept_transfer(&batch(), &mfg()).await.unwrap_err();
        assert!(matches!(
            rejection(err),
            Rejection::NotDesignatedRecipient { .. }
        ));

        m.accept_transfer(&batch(), &log()).await.unwrap();
        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.owner, Some(log()));
        assert_eq!(status.pending_owner, None);
        assert_eq!(status.state, CustodyState::Registered);
    }

    // -----------------------------------------------------------------------
    // 2. Violations overlay custody without touching it
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn violation_does_not_block_transfer() {
        let m = registered().await;
        m.report_violation(&batch(), "temp excursion", &log())
            .await
            .unwrap();
        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.violation.as_deref(), Some("temp excursion"));
        assert_eq!(status.owner, Some(mfg()));

        m.initiate_transfer(&batch(), &log(), &mfg()).await.unwrap();
    }

    #[tokio::test]
    async fn violation_during_pending_transfer_keeps_it_acceptable() {
        let m = registered().await;
        m.initiate_transfer(&batch(), &log(), &mfg()).await.unwrap();
        m.report_violation(&batch(), "seal broken", &ret())
            .await
            .unwrap();
        m.report_violation(&batch(), "temp excursion", &ret())
            .await
            .unwrap();

        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.pending_owner, Some(log()));
        assert_eq!(status.violation.as_deref(), Some("temp excursion"));

        m.accept_transfer(&batch(), &log()).await.unwrap();
        let record = m.get_record(&batch()).await.unwrap();
        assert_eq!(record.owner, log());
        assert_eq!(record.violation.as_deref(), Some("temp excursion"));
    }

    // -----------------------------------------------------------------------
    // 3. Rejections
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn second_registration_fails_regardless_of_payload() {
        let m = registered().await;
        let err = m
            .register(&batch(), &MetadataRef::from("ipfs://other"), &ret())
            .await
            .unwrap_err();
        assert_eq!(rejection(err), Rejection::AlreadyExists(batch()));
    }

    #[tokio::test]
    async fn operations_on_missing_batch_are_not_found() {
        let m = machine();
        let ghost = BatchId::from("ghost");
        let err = m.initiate_transfer(&ghost, &log(), &mfg()).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::NotFound(ghost.clone()));
        let err = m.accept_transfer(&ghost, &log()).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::NotFound(ghost.clone()));
        let err = m.report_violation(&ghost, "x", &log()).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::NotFound(ghost.clone()));
        let err = m.get_record(&ghost).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::NotFound(ghost.clone()));

        let status = m.get_status(&ghost).await.unwrap();
        assert!(!status.exists);
        assert_eq!(status.state, CustodyState::Unregistered);
    }

    #[tokio::test]
    async fn overlapping_transfer_is_rejected() {
        let m = registered().await;
        m.initiate_transfer(&batch(), &log(), &mfg()).await.unwrap();
        let err = m.initiate_transfer(&batch(), &ret(), &mfg()).await.unwrap_err();
        assert!(matches!(
            rejection(err),
            Rejection::TransferAlreadyPending { pending_owner, .. } if pending_owner == log()
        ));
    }

    #[tokio::test]
    async fn accept_without_pending_transfer() {
        let m = registered().await;
        let err = m.accept_transfer(&batch(), &log()).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::NoPendingTransfer(batch()));
    }

    #[tokio::test]
    async fn non_owner_cannot_initiate() {
        let m = registered().await;
        let err = m.initiate_transfer(&batch(), &ret(), &log()).await.unwrap_err();
        assert!(matches!(rejection(err), Rejection::NotOwner { .. }));
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_store() {
        let store = Arc::new(FaultyStore::new());
        let m = CustodyMachine::with_defaults(store.clone());
        let err = m
            .register(&BatchId::from("  "), &MetadataRef::from("ipfs://abc"), &mfg())
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), Rejection::InvalidInput(_)));
        let err = m.report_violation(&batch(), "   ", &mfg()).await.unwrap_err();
        assert!(matches!(rejection(err), Rejection::InvalidInput(_)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // 4. Infrastructure and ambiguous failures
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn unavailable_ledger_is_not_a_rejection() {
        let mut store = FaultyStore::new();
        store.commit_error = Some(StoreError::Unavailable("connection refused".into()));
        let m = CustodyMachine::with_defaults(Arc::new(store));

        let err = m
            .register(&batch(), &MetadataRef::from("ipfs://abc"), &mfg())
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::Infrastructure(_)));
        assert!(err.is_retryable());
        assert_eq!(err.outcome(), Outcome::NotApplied);
    }

    #[tokio::test]
    async fn lost_confirmation_is_ambiguous() {
        let mut store = FaultyStore::new();
        store.commit_error = Some(StoreError::Ambiguous("connection reset".into()));
        let m = CustodyMachine::with_defaults(Arc::new(store));

        let err = m
            .register(&batch(), &MetadataRef::from("ipfs://abc"), &mfg())
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::AmbiguousCommit { .. }));
        assert_eq!(err.outcome(), Outcome::Unknown);
    }

    #[tokio::test]
    async fn commit_deadline_yields_unknown_outcome() {
        let mut store = FaultyStore::new();
        store.commit_delay = Some(Duration::from_secs(5));
        let m = CustodyMachine::with_defaults(Arc::new(store));

        let options = WriteOptions::default().deadline(Duration::from_millis(20));
        let transition = Transition::Register {
            metadata_ref: MetadataRef::from("ipfs://abc"),
        };
        let err = m
            .execute(&batch(), &transition, &mfg(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::AmbiguousCommit { .. }));
    }

    #[tokio::test]
    async fn slow_read_is_an_infrastructure_timeout() {
        let mut store = FaultyStore::new();
        store.read_delay = Some(Duration::from_secs(5));
        let config = MachineConfig {
            read_deadline_ms: 20,
            ..MachineConfig::default()
        };
        let m = CustodyMachine::new(Arc::new(store), config);

        let err = m.get_status(&batch()).await.unwrap_err();
        assert!(matches!(
            err,
            CustodyError::Infrastructure(StoreError::Timeout(_))
        ));
    }

    // -----------------------------------------------------------------------
    // 5. Concurrency
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn race_loser_gets_business_rejection() {
        let inner = InMemoryStore::new();
        inner
            .commit(&Commit {
                batch_id: batch(),
                expected_seq: 0,
                initiator: mfg(),
                operation: Operation::Register {
                    metadata_ref: MetadataRef::from("ipfs://abc"),
                },
                idempotency_key: None,
            })
            .await
            .unwrap();
        let competitor = Commit {
            batch_id: batch(),
            expected_seq: 1,
            initiator: mfg(),
            operation: Operation::InitiateTransfer {
                from: mfg(),
                to: log(),
            },
            idempotency_key: None,
        };
        let store = RacingStore {
            inner,
            competitor,
            raced: AtomicBool::new(false),
        };
        let m = CustodyMachine::with_defaults(Arc::new(store));

        let err = m.initiate_transfer(&batch(), &ret(), &mfg()).await.unwrap_err();
        assert!(matches!(
            rejection(err),
            Rejection::TransferAlreadyPending { pending_owner, .. } if pending_owner == log()
        ));
        let record = m.get_record(&batch()).await.unwrap();
        assert_eq!(record.pending_owner, Some(log()));
    }

    #[tokio::test]
    async fn endless_conflicts_give_up() {
        let mut store = FaultyStore::new();
        store.commit_error = Some(StoreError::Conflict {
            batch_id: batch(),
            expected: 0,
            actual: 1,
        });
        let store = Arc::new(store);
        let m = CustodyMachine::with_defaults(store.clone());

        let err = m
            .register(&batch(), &MetadataRef::from("ipfs://abc"), &mfg())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::ConflictRetriesExhausted { attempts: 4, .. }
        ));
        assert_eq!(store.commits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn concurrent_registrations_have_one_winner() {
        let m = Arc::new(machine());
        let mut handles = Vec::new();
        for i in 0..8 {
            let m = m.clone();
            handles.push(tokio::spawn(async move {
                let who = PartyId::new(format!("party-{i}"));
                m.register(&batch(), &MetadataRef::from("ipfs://abc"), &who)
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert_eq!(rejection(err), Rejection::AlreadyExists(batch())),
            }
        }
        assert_eq!(winners, 1);
    }

    // -----------------------------------------------------------------------
    // 6. Idempotent writes
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn idempotent_retry_replays_receipt() {
        let m = machine();
        let key = IdempotencyKey::generate();
        let transition = Transition::Register {
            metadata_ref: MetadataRef::from("ipfs://abc"),
        };
        let options = WriteOptions::with_key(key);

        let first = m.execute(&batch(), &transition, &mfg(), &options).await.unwrap();
        let again = m.execute(&batch(), &transition, &mfg(), &options).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(m.custody_history(&batch()).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn reused_key_for_different_payload_is_invalid() {
        let m = registered().await;
        let options = WriteOptions::with_key(IdempotencyKey::from("op-1"));
        m.execute(
            &batch(),
            &Transition::ReportViolation {
                details: "temp excursion".into(),
            },
            &log(),
            &options,
        )
        .await
        .unwrap();

        let err = m
            .execute(
                &batch(),
                &Transition::ReportViolation {
                    details: "different".into(),
                },
                &log(),
                &options,
            )
            .await
            .unwrap_err();
        assert_eq!(err.rejection().map(Rejection::code), Some("invalid_input"));
        let record = m.get_record(&batch()).await.unwrap();
        assert_eq!(record.violation.as_deref(), Some("temp excursion"));
        assert_eq!(record.seq, 2);
    }

    #[tokio::test]
    async fn reused_key_for_different_operation_is_invalid() {
        let m = machine();
        let options = WriteOptions::with_key(IdempotencyKey::from("op-1"));
        let register = Transition::Register {
            metadata_ref: MetadataRef::from("ipfs://abc"),
        };
        m.execute(&batch(), &register, &mfg(), &options).await.unwrap();

        let err = m
            .execute(
                &batch(),
                &Transition::InitiateTransfer { to: log() },
                &mfg(),
                &options,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::Rejected(Rejection::InvalidInput(_))
        ));
        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.pending_owner, None);
        assert_eq!(m.get_record(&batch()).await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn reused_key_from_another_party_is_invalid() {
        let m = registered().await;
        let options = WriteOptions::with_key(IdempotencyKey::from("op-1"));
        let violation = Transition::ReportViolation {
            details: "temp excursion".into(),
        };
        m.execute(&batch(), &violation, &log(), &options).await.unwrap();
        let err = m
            .execute(&batch(), &violation, &ret(), &options)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::Rejected(Rejection::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn blank_idempotency_key_is_rejected() {
        let m = machine();
        let err = m
            .execute(
                &batch(),
                &Transition::Register {
                    metadata_ref: MetadataRef::from("ipfs://abc"),
                },
                &mfg(),
                &WriteOptions::with_key(IdempotencyKey::from("  ")),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::Rejected(Rejection::InvalidInput(_))
        ));
        assert!(!m.get_status(&batch()).await.unwrap().exists);
    }

    // -----------------------------------------------------------------------
    // 7. Audit reads
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn history_and_verify() {
        let m = registered().await;
        m.initiate_transfer(&batch(), &log(), &mfg()).await.unwrap();
        let receipt = m.accept_transfer(&batch(), &log()).await.unwrap();

        let timeline = m.custody_history(&batch()).await.unwrap();
        assert_eq!(timeline.entries.len(), 3);
        assert_eq!(timeline.entries[2].actor, log());
        assert_eq!(timeline.entries[2].transaction_ref, receipt.transaction_ref);

        let report = m.verify(&batch()).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entry_count, 3);

        let status = m.get_status(&batch()).await.unwrap();
        assert_eq!(status.proof_ref, Some(receipt.transaction_ref));
        assert_eq!(status.notarized_at, Some(receipt.confirmed_at));
    }

    #[tokio::test]
    async fn audit_reads_on_missing_batch() {
        let m = machine();
        let ghost = BatchId::from("ghost");
        assert!(m.custody_history(&ghost).await.is_err());
        assert!(m.verify(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn repeated_status_reads_are_identical() {
        let m = registered().await;
        let a = m.get_status(&batch()).await.unwrap();
        let b = m.get_status(&batch()).await.unwrap();
        assert_eq!(a, b);
    }
}
