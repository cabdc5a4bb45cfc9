//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Services hosted by this process, e.g. `["sales", "stock"]`.
    pub services: Vec<&'static str>,
}

/// GET /health — reports liveness and the hosted services.
pub async fn check(State(services): State<Vec<&'static str>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        services,
    })
}
