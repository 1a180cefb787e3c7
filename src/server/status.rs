//! `GET /status`: the §4.8 status view over HTTP, for operators and
//! monitoring. `GET /metrics` exposes the §2.10 Prometheus facade.
//! Read-only — this router never exposes a mutation route, since acting
//! as an ACME server is an explicit non-goal.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::health::{HealthCheck, health_handler};
use crate::error::{DriverError, Result};
use crate::renewal::RenewalSupervisor;
use crate::status::build;

#[derive(Clone)]
pub struct StatusServerState {
    pub supervisor: Arc<RenewalSupervisor>,
    pub health: Arc<HealthCheck>,
}

async fn status_handler(State(state): State<StatusServerState>) -> impl IntoResponse {
    let statuses = build(&state.supervisor).await;
    (StatusCode::OK, Json(statuses))
}

async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, crate::metrics::global().gather_text())
}

pub fn router(state: StatusServerState) -> Router {
    let status_router = Router::new()
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());
    let health_router = Router::new().route("/healthz", get(health_handler)).with_state(state.health);
    status_router.merge(health_router)
}

/// Serves the status/health surface until the process exits.
pub async fn serve(addr: SocketAddr, supervisor: Arc<RenewalSupervisor>) -> Result<()> {
    let state = StatusServerState { supervisor, health: Arc::new(HealthCheck::new()) };
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DriverError::fatal(format!("bind status server on {}: {}", addr, e)))?;
    tracing::info!(%addr, "status server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| DriverError::fatal(format!("status server: {}", e)))
}
