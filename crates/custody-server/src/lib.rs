//! HTTP API for batch custody.
//!
//! Exposes the custody state machine over JSON: batch registration,
//! two-phase custody handoff, violation reports, status reads, and the
//! audit endpoints (timeline and chain verification). Callers identify as
//! a party or a supply-chain role through request headers.

pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod router;
pub mod server;

pub use config::{CustodyConfig, ServerConfig};
pub use error::{ErrorBody, ServerError, ServerResult};
pub use identity::{Caller, IDEMPOTENCY_HEADER, PARTY_HEADER, ROLE_HEADER};
pub use router::{build_router, AppState};
pub use server::CustodyServer;
