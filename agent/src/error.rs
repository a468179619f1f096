//! Agent error taxonomy (§6: "Agent HTTP/JSON on machine port 8080... Same
//! error shape" as the control plane). Input validation failures are 400;
//! everything the subprocess layer or tunnel backend reports back is 500,
//! since there's no caller-actionable distinction the agent can make on a
//! failed `wg`/`docker compose` invocation.

use crate::stack::StackError;
use crate::tunnel::TunnelError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use cilo_protocol::control::ErrorResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Stack(#[from] StackError),
}

impl IntoResponse for AgentError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AgentError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AgentError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AgentError::Tunnel(err) => {
                tracing::error!(error = %err, "tunnel backend error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            AgentError::Stack(err) => {
                tracing::error!(error = %err, "stack runner error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
