/// Errors raised while constructing a [`LedgerClient`](crate::LedgerClient).
///
/// Request-time failures are reported as
/// [`StoreError`](custody_ledger::StoreError) through the store trait.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid ledger endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
