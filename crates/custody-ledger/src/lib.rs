//! Notarization ledger for batch custody.
//!
//! This crate holds everything below the custody state machine:
//! - Ledger records: operations, commits, receipts, and hash-linked entries
//! - The [`CustodyStore`] trait boundary shared by every backing store
//! - [`InMemoryStore`], the in-process fallback used when no ledger is configured
//! - Stream validation (sequence, hash chain, fold)
//! - The batch read projection and custody timeline

pub mod chain;
pub mod error;
pub mod memory;
pub mod projection;
pub mod records;
pub mod traits;
pub mod validation;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use projection::{BatchStatus, CustodyState, CustodyTimeline, ProjectionBuilder, TimelineEntry};
pub use records::{
    BatchRecord, Commit, CommitReceipt, LedgerEntry, Notarization, Operation, OperationKind,
};
pub use traits::CustodyStore;
pub use validation::{ChainValidator, IntegrityIssue, IntegrityReport, IssueKind};
