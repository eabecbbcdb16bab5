use async_trait::async_trait;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use custody_ledger::{BatchStatus, CommitReceipt, CustodyTimeline, IntegrityReport};
use custody_machine::{Transition, WriteOptions};
use custody_types::{BatchId, IdempotencyKey, MetadataRef};

use crate::error::{ServerError, ServerResult};
use crate::identity::{header_str, resolve_party, Caller, IDEMPOTENCY_HEADER};
use crate::router::AppState;

/// JSON request body whose decode failures answer with [`ServerError`]
/// instead of axum's plain-text rejection.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub batch_id: BatchId,
    pub metadata_ref: MetadataRef,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Party id or role name.
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct ViolationRequest {
    pub details: String,
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "custody-server",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.machine().backend(),
    }))
}

pub async fn register_handler(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ServerResult<(StatusCode, Json<CommitReceipt>)> {
    let transition = Transition::Register {
        metadata_ref: req.metadata_ref,
    };
    let receipt = write(&state, &req.batch_id, &transition, &caller, &headers).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn transfer_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
    caller: Caller,
    headers: HeaderMap,
    JsonBody(req): JsonBody<TransferRequest>,
) -> ServerResult<Json<CommitReceipt>> {
    let to = resolve_party(&req.to, state.parties())?;
    let transition = Transition::InitiateTransfer { to };
    let receipt = write(&state, &batch_id, &transition, &caller, &headers).await?;
    Ok(Json(receipt))
}

pub async fn accept_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
    caller: Caller,
    headers: HeaderMap,
) -> ServerResult<Json<CommitReceipt>> {
    let receipt = write(&state, &batch_id, &Transition::AcceptTransfer, &caller, &headers).await?;
    Ok(Json(receipt))
}

pub async fn violation_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
    caller: Caller,
    headers: HeaderMap,
    JsonBody(req): JsonBody<ViolationRequest>,
) -> ServerResult<Json<CommitReceipt>> {
    let transition = Transition::ReportViolation {
        details: req.details,
    };
    let receipt = write(&state, &batch_id, &transition, &caller, &headers).await?;
    Ok(Json(receipt))
}

pub async fn status_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
) -> ServerResult<Json<BatchStatus>> {
    Ok(Json(state.machine().get_status(&batch_id).await?))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
) -> ServerResult<Json<CustodyTimeline>> {
    Ok(Json(state.machine().custody_history(&batch_id).await?))
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
) -> ServerResult<Json<IntegrityReport>> {
    Ok(Json(state.machine().verify(&batch_id).await?))
}

async fn write(
    state: &AppState,
    batch_id: &BatchId,
    transition: &Transition,
    caller: &Caller,
    headers: &HeaderMap,
) -> ServerResult<CommitReceipt> {
    let options = WriteOptions {
        idempotency_key: header_str(headers, IDEMPOTENCY_HEADER)?.map(IdempotencyKey::new),
        ..WriteOptions::default()
    };
    tracing::debug!(
        batch_id = %batch_id,
        caller = %caller.party,
        role = ?caller.role,
        kind = %transition.kind(),
        "custody write requested"
    );
    Ok(state
        .machine()
        .execute(batch_id, transition, &caller.party, &options)
        .await?)
}
