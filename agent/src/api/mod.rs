//! # On-Machine Agent HTTP API (§4.5)
//!
//! Route table for the long-running agent process. Split by resource
//! family the same way `cilo-server::api` is, one handler module per
//! concern.

pub mod environment;
pub mod health;
pub mod wireguard;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/environment/up", post(environment::up))
        .route("/environment/down", post(environment::down))
        .route("/environment/status", get(environment::status))
        .route("/environment/logs/{service}", get(environment::logs))
        .route("/wireguard/add-peer", post(wireguard::add_peer))
        .route("/wireguard/remove-peer/{key}", delete(wireguard::remove_peer))
        .route("/wireguard/status", get(wireguard::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
