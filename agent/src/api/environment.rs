//! `/environment/*` handlers (§4.5): starting, stopping, and observing the
//! container stack for whichever environment is currently assigned to this
//! machine. The agent does not itself know anything about containers
//! beyond what `StackRunner` reports — per §1's "opaque sub-process
//! executor" scoping.

use crate::error::{AgentError, AgentResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cilo_protocol::agent::{
    EnvironmentDownRequest, EnvironmentStatusResponse, EnvironmentUpRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::StreamExt;

pub async fn up(
    State(state): State<AppState>,
    Json(req): Json<EnvironmentUpRequest>,
) -> AgentResult<Json<Value>> {
    if req.env_name.trim().is_empty() || req.workspace_path.trim().is_empty() {
        return Err(AgentError::BadRequest(
            "env_name and workspace_path are required".into(),
        ));
    }
    state
        .stack
        .up(&req.workspace_path, &req.env_name, &req.subnet)
        .await?;
    Ok(Json(json!({"status": "starting"})))
}

pub async fn down(
    State(state): State<AppState>,
    Json(req): Json<EnvironmentDownRequest>,
) -> AgentResult<Json<Value>> {
    if req.env_name.trim().is_empty() {
        return Err(AgentError::BadRequest("env_name is required".into()));
    }
    state.stack.down(&req.env_name).await?;
    Ok(Json(json!({"status": "stopped"})))
}

#[derive(Debug, Deserialize)]
pub struct EnvNameQuery {
    pub env_name: String,
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<EnvNameQuery>,
) -> AgentResult<Json<EnvironmentStatusResponse>> {
    if query.env_name.trim().is_empty() {
        return Err(AgentError::BadRequest("env_name is required".into()));
    }
    let services = state.stack.status(&query.env_name).await?;
    Ok(Json(EnvironmentStatusResponse {
        env_name: query.env_name,
        services,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub env_name: String,
    #[serde(default)]
    pub follow: bool,
}

/// `GET /environment/logs/{service}?env_name=...&follow=bool`. Streams the
/// subprocess's stdout directly to the response body; dropping the
/// response future (the HTTP client disconnecting, or axum cancelling the
/// handler) drops the underlying `LogProcess`, which kills the subprocess
/// (spec §4.5: "Cancellation of the HTTP request closes the pipe and
/// signals the subprocess").
pub async fn logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<LogsQuery>,
) -> AgentResult<Response> {
    if query.env_name.trim().is_empty() || service.trim().is_empty() {
        return Err(AgentError::BadRequest(
            "env_name and service are required".into(),
        ));
    }

    let process = state.stack.logs(&query.env_name, &service, query.follow)?;
    let stream = process.into_stream().map(|line| {
        line.map(|mut s| {
            s.push('\n');
            axum::body::Bytes::from(s)
        })
    });

    Ok((
        [("content-type", "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}
