//! Liveness probe, mounted outside the authenticated API.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;

/// Probe response; `status` reads `"healthy"` whenever the process answers.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Fixed status marker.
    pub status: &'static str,
    /// Serving crate name.
    pub service: &'static str,
    /// Running version.
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Creates the probe route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
