//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: String,
    environment: String,
    timestamp: String,
}

/// Liveness probe: GET /api/v1/healthz
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.app_name,
        environment: state.environment,
        timestamp: Utc::now().to_rfc3339(),
    })
}
