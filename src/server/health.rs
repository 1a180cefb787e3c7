//! Liveness check: `GET /healthz`. Kept separate from the richer
//! `GET /status` view (§4.8) since a load balancer/process supervisor only
//! needs a cheap yes/no, not a full per-MD report.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Tracks process start time; nothing more, since "healthy" here means
/// "the process is up and serving," not a dependency health aggregate.
pub struct HealthCheck {
    start_time: Instant,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn status(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

pub async fn health_handler(
    axum::extract::State(health): axum::extract::State<std::sync::Arc<HealthCheck>>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(health.status()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_healthy_with_current_version() {
        let check = HealthCheck::new();
        let status = check.status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    }
}
