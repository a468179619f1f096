//! # API Error Taxonomy
//!
//! Implements the error classes from spec §7: input, auth, not-found,
//! conflict, exhaustion, downstream and internal failures each map to a
//! fixed HTTP status and a `{"error": "<message>"}` body.

use axum::{http::StatusCode, response::IntoResponse, Json};
use cilo_protocol::control::ErrorResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("scope {required} required")]
    Forbidden { required: &'static str },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Exhausted(String),

    #[error("downstream failure: {0}")]
    Downstream(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // Auth failures return a generic message regardless of cause, per
        // §4.1: "Mismatch, absent header, unrecognized prefix, and
        // wrong-format token all return 401 with a generic error."
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "invalid or missing credentials".to_string(),
            ),
            ApiError::Forbidden { .. } => {
                (StatusCode::FORBIDDEN, "insufficient scope".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Exhausted(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Downstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database unavailable".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
