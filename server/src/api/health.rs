//! `/health` and `/status` — unauthenticated liveness and version endpoints
//! (§4.1's routing table lists these with scope "none").

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cilo_protocol::control::{HealthResponse, StatusResponse};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_s: state.started_at.elapsed().as_secs(),
    })
}
