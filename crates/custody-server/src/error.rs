use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use custody_client::ClientError;
use custody_machine::{CustodyError, Outcome, Rejection};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error("caller identity missing: send x-custody-party or x-custody-role")]
    MissingIdentity,

    #[error("no party configured for role {0}")]
    UnmappedRole(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ledger client error: {0}")]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// JSON body of every error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    pub outcome: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Custody(CustodyError::Rejected(rejection)) => match rejection {
                Rejection::NotFound(_) => StatusCode::NOT_FOUND,
                Rejection::AlreadyExists(_)
                | Rejection::TransferAlreadyPending { .. }
                | Rejection::NoPendingTransfer(_) => StatusCode::CONFLICT,
                Rejection::NotOwner { .. } | Rejection::NotDesignatedRecipient { .. } => {
                    StatusCode::FORBIDDEN
                }
                Rejection::InvalidInput(_) => StatusCode::BAD_REQUEST,
            },
            Self::Custody(CustodyError::AmbiguousCommit { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Custody(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::UnmappedRole(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Client(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Custody(err) => err.code(),
            Self::MissingIdentity => "missing_identity",
            Self::UnmappedRole(_) => "unmapped_role",
            Self::BadRequest(_) => "bad_request",
            Self::Config(_) | Self::Client(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }

    fn body(&self) -> ErrorBody {
        let (retryable, outcome) = match self {
            Self::Custody(err) => (err.is_retryable(), err.outcome()),
            Self::Config(_) | Self::Client(_) | Self::Io(_) | Self::Internal(_) => {
                (false, Outcome::NotApplied)
            }
            _ => (false, Outcome::Rejected),
        };
        ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            retryable,
            outcome: outcome.as_str().to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
