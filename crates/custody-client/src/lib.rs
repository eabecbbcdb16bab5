//! HTTP client for the external notarization ledger.
//!
//! [`LedgerClient`] implements [`CustodyStore`](custody_ledger::CustodyStore)
//! over a small JSON protocol, so the custody state machine runs unchanged
//! against either the remote ledger or the in-memory fallback store.

pub mod client;
pub mod config;
pub mod error;
pub mod wire;

pub use client::LedgerClient;
pub use config::LedgerClientConfig;
pub use error::{ClientError, ClientResult};
