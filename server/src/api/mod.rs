//! # Control-Plane HTTP API (§4.1)
//!
//! Route table assembly. Individual handlers live in sibling modules, one
//! per resource family, the way the teacher's `api.rs`/`handlers.rs` split
//! by concern rather than putting everything in one file.

pub mod admin;
pub mod environments;
pub mod health;
pub mod machines;
pub mod wireguard;

use crate::auth::require_auth;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps every response with a request id, generating one if the caller
/// didn't supply it. Cheap tracing correlation without pulling in a full
/// OpenTelemetry stack for a control plane this size.
async fn request_id(request: Request<axum::body::Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route(
            "/v1/environments",
            post(environments::create).get(environments::list),
        )
        .route(
            "/v1/environments/{id}",
            get(environments::get).delete(environments::teardown),
        )
        .route("/v1/machines", post(machines::register).get(machines::list))
        .route("/v1/machines/{id}/health", post(machines::report_health))
        .route("/v1/wireguard/exchange", post(wireguard::exchange))
        .route("/v1/wireguard/peers/{key}", delete(wireguard::remove_peer))
        .route("/v1/wireguard/status/{environment_id}", get(wireguard::status))
        .route("/v1/admin/teams", post(admin::create_team))
        .route("/v1/admin/teams/{id}/keys", post(admin::create_key))
        .route("/v1/admin/keys/{id}", delete(admin::delete_key))
        .route_layer(middleware::from_fn_with_state(
            state.store.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        .merge(authenticated)
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
