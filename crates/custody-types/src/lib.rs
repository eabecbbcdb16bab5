//! Foundation types for the custody ledger.
//!
//! This crate provides the identifiers and role vocabulary shared by every
//! other custody crate.
//!
//! # Key Types
//!
//! - [`BatchId`]: caller-supplied batch identifier
//! - [`PartyId`]: address or identity of a custodian
//! - [`MetadataRef`]: off-chain content pointer attached at registration
//! - [`TransactionRef`]: opaque notarization proof for a confirmed commit
//! - [`IdempotencyKey`]: makes a logical write safe to resend
//! - [`Role`] / [`PartyDirectory`]: custody-chain roles and their parties

pub mod error;
pub mod ids;
pub mod role;

pub use error::TypeError;
pub use ids::{BatchId, IdempotencyKey, MetadataRef, PartyId, TransactionRef};
pub use role::{PartyDirectory, Role};
