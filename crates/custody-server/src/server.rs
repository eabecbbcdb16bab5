use std::sync::Arc;

use tokio::net::TcpListener;

use custody_client::LedgerClient;
use custody_ledger::{CustodyStore, InMemoryStore};
use custody_machine::CustodyMachine;

use crate::config::CustodyConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, build_router_with_cors, AppState};

/// Custody HTTP service.
pub struct CustodyServer {
    config: CustodyConfig,
}

impl CustodyServer {
    pub fn new(config: CustodyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    /// The configured ledger, or the in-memory fallback when none is set.
    pub fn build_store(&self) -> ServerResult<Arc<dyn CustodyStore>> {
        match &self.config.ledger {
            Some(ledger) => {
                tracing::info!(endpoint = %ledger.endpoint, "using notarization ledger");
                Ok(Arc::new(LedgerClient::new(ledger.clone())?))
            }
            None => {
                tracing::warn!("no ledger configured; custody state will not survive a restart");
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }

    pub fn state(&self) -> ServerResult<AppState> {
        let machine = CustodyMachine::new(self.build_store()?, self.config.machine.clone());
        Ok(AppState::new(machine, self.config.parties.clone()))
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> ServerResult<axum::Router> {
        let state = self.state()?;
        Ok(if self.config.server.allow_any_origin {
            build_router_with_cors(state)
        } else {
            build_router(state)
        })
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router()?;
        let listener = TcpListener::bind(self.config.server.bind_addr).await?;
        tracing::info!("custody server listening on {}", self.config.server.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
