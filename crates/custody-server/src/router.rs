use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use custody_machine::CustodyMachine;
use custody_types::PartyDirectory;

use crate::handler;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    machine: Arc<CustodyMachine>,
    parties: Arc<PartyDirectory>,
}

impl AppState {
    pub fn new(machine: CustodyMachine, parties: PartyDirectory) -> Self {
        Self {
            machine: Arc::new(machine),
            parties: Arc::new(parties),
        }
    }

    pub fn machine(&self) -> &CustodyMachine {
        &self.machine
    }

    pub fn parties(&self) -> &PartyDirectory {
        &self.parties
    }
}

/// Build the axum router with all custody endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/batches", post(handler::register_handler))
        .route("/v1/batches/:id", get(handler::status_handler))
        .route("/v1/batches/:id/transfer", post(handler::transfer_handler))
        .route("/v1/batches/:id/accept", post(handler::accept_handler))
        .route("/v1/batches/:id/violations", post(handler::violation_handler))
        .route("/v1/batches/:id/history", get(handler::history_handler))
        .route("/v1/batches/:id/verify", get(handler::verify_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// [`build_router`] plus a permissive CORS layer for browser portals.
pub fn build_router_with_cors(state: AppState) -> Router {
    build_router(state).layer(CorsLayer::permissive())
}
