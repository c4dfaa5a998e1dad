use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// GET /health — liveness probe.
pub async fn health_route() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
