use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid transaction reference: {0}")]
    InvalidTransactionRef(String),
}
