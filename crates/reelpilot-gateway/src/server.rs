//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use reelpilot_core::{ReelPilotError, Result};
use reelpilot_ledger::SpendLedger;
use reelpilot_runner::{RunLog, RunService};
use reelpilot_scheduler::{DispatchHistory, ScheduleStore};

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub schedule: Arc<ScheduleStore>,
    pub history: Arc<DispatchHistory>,
    pub runs: Arc<RunService>,
    pub run_log: Arc<RunLog>,
    pub ledger: Arc<SpendLedger>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/schedule", get(super::routes::get_schedule))
        .route("/api/v1/schedule/update", post(super::routes::update_schedule))
        .route(
            "/api/v1/runs",
            get(super::routes::list_runs).post(super::routes::trigger_run),
        )
        .route("/api/v1/runs/{id}", get(super::routes::run_status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ReelPilotError::Config(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Gateway listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| ReelPilotError::Process(format!("Gateway server error: {e}")))?;
    Ok(())
}
