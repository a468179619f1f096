//! `/wireguard/*` handlers (§4.5). Validation is defensive per spec:
//! a malformed public key or CIDR list returns 400 without touching the
//! tunnel interface at all.

use crate::error::{AgentError, AgentResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use cilo_protocol::agent::{AddPeerRequest, AgentPeerInfo, WireguardStatusResponse};
use cilo_protocol::validate::{validate_cidr, validate_public_key};
use serde_json::{json, Value};

/// `POST /wireguard/add-peer`. Set-semantic: re-posting the same key
/// replaces its allowed-IP set rather than unioning with the previous one
/// (spec §4.5, §8's idempotence property) — the tunnel backend gets this
/// for free from the underlying `wg set` replace semantics.
pub async fn add_peer(
    State(state): State<AppState>,
    Json(req): Json<AddPeerRequest>,
) -> AgentResult<Json<Value>> {
    if !validate_public_key(&req.public_key) {
        return Err(AgentError::BadRequest(
            "public_key must be a 44-character base64 string".into(),
        ));
    }
    let allowed_ips = validate_cidr(&req.allowed_ips).ok_or_else(|| {
        AgentError::BadRequest("allowed_ips must be a non-empty comma-separated CIDR list".into())
    })?;

    state.tunnel.add_peer(&req.public_key, &allowed_ips).await?;
    Ok(Json(json!({"added": true})))
}

/// `DELETE /wireguard/remove-peer/{key}`. Idempotent: removing an absent
/// peer is not an error (spec §4.5).
pub async fn remove_peer(
    State(state): State<AppState>,
    Path(public_key): Path<String>,
) -> AgentResult<Json<Value>> {
    if !validate_public_key(&public_key) {
        return Err(AgentError::BadRequest(
            "public_key must be a 44-character base64 string".into(),
        ));
    }
    state.tunnel.remove_peer(&public_key).await?;
    Ok(Json(json!({"removed": true})))
}

pub async fn status(State(state): State<AppState>) -> AgentResult<Json<WireguardStatusResponse>> {
    let peers: Vec<AgentPeerInfo> = state.tunnel.list_peers().await?;
    Ok(Json(WireguardStatusResponse { peers }))
}
