//! `GET /health` (§4.5).

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cilo_protocol::agent::AgentHealthResponse;

pub async fn health(State(state): State<AppState>) -> Json<AgentHealthResponse> {
    Json(AgentHealthResponse {
        status: "healthy",
        machine_id: state.settings.machine_id.clone(),
    })
}
