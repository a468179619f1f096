//! `/v1/wireguard/*` handlers — the key-exchange protocol (§4.1) and its
//! symmetric remove/status operations.

use crate::auth::{require_scope, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::peers::{InsertPeerError, NewPeer};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use cilo_protocol::control::{ExchangeRequest, ExchangeResponse, PeerDto, Scope, WireguardStatusDto};
use cilo_protocol::validate::{validate_public_key, OVERLAY_SUBNET};
use serde::Deserialize;
use uuid::Uuid;

fn peer_to_dto(row: &crate::store::models::PeerRow) -> PeerDto {
    PeerDto {
        id: row.id.to_string(),
        machine_id: row.machine_id.to_string(),
        environment_id: row.environment_id.to_string(),
        user_id: row.user_id.clone(),
        public_key: row.public_key.clone(),
        assigned_ip: row.assigned_ip.ip().to_string(),
        connected_at: row.connected_at.to_rfc3339(),
        last_seen: row.last_seen.map(|t| t.to_rfc3339()),
    }
}

/// `POST /v1/wireguard/exchange`. Allocates an overlay IP, persists the
/// `Peer` row, and dispatches the add-peer call to the machine's agent —
/// synchronously but best-effort: an unreachable agent is logged, not
/// surfaced, because the `Peer` row already makes the exchange durable and
/// the peer reconciler (§4.3) will replay the add later.
pub async fn exchange(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ExchangeRequest>,
) -> ApiResult<Json<ExchangeResponse>> {
    require_scope(&ctx, Scope::Write)?;

    if !validate_public_key(&req.public_key) {
        return Err(ApiError::BadRequest(
            "public_key must be a 44-character base64 string".into(),
        ));
    }

    let environment_id = Uuid::parse_str(&req.environment_id)
        .map_err(|_| ApiError::BadRequest("environment_id is not a valid uuid".into()))?;
    let machine_id = Uuid::parse_str(&req.machine_id)
        .map_err(|_| ApiError::BadRequest("machine_id is not a valid uuid".into()))?;

    let env = state
        .store
        .get_environment(environment_id)
        .await?
        .filter(|e| e.team_id == ctx.team_id)
        .ok_or_else(|| ApiError::NotFound("environment".into()))?;

    let machine = state
        .store
        .get_machine(machine_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("machine".into()))?;

    let bound_to_this_env = machine.assigned_env == Some(env.id);
    if !(machine.status == "ready" || (machine.status == "assigned" && bound_to_this_env)) {
        return Err(ApiError::Conflict(
            "machine is not ready or assigned to this environment".into(),
        ));
    }

    let assigned_ip = state.allocator.allocate(machine.id).await.map_err(|e| {
        ApiError::Exhausted(format!("overlay subnet exhausted for this machine: {e}"))
    })?;

    // `user_id` is derived from the authenticated key, never the request
    // body (SPEC_FULL.md open question 4) — a client-supplied `user_id`
    // would let one team member register peers under another's identity.
    let peer = state
        .store
        .insert_peer(NewPeer {
            machine_id: machine.id,
            environment_id: env.id,
            user_id: Some(ctx.key_id.to_string()),
            public_key: req.public_key.clone(),
            assigned_ip,
        })
        .await
        .map_err(|e| match e {
            InsertPeerError::PublicKeyConflict => {
                ApiError::Conflict("public key already registered".into())
            }
            InsertPeerError::Database(e) => ApiError::Database(e),
        })?;

    let machine_public_key = machine.wg_public_key.clone().unwrap_or_default();
    let endpoint = machine.wg_endpoint.clone().unwrap_or_default();
    let allowed_ips = vec![
        format!("{}/32", peer.assigned_ip.ip()),
        env.subnet.to_string(),
        OVERLAY_SUBNET.to_string(),
    ];

    let host = machine.public_ip.ip().to_string();
    let allowed_ips_csv = allowed_ips.join(",");
    if let Err(err) = state
        .agent_client
        .add_peer(&host, &req.public_key, &allowed_ips_csv)
        .await
    {
        tracing::warn!(
            machine_id = %machine.id,
            public_key = %req.public_key,
            error = %err,
            "agent unreachable during exchange; reconciler will retry"
        );
    }

    Ok(Json(ExchangeResponse {
        machine_public_key,
        endpoint,
        assigned_ip: peer.assigned_ip.ip().to_string(),
        allowed_ips,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RemovePeerQuery {
    pub machine_id: Uuid,
}

/// `DELETE /v1/wireguard/peers/{key}?machine_id=...`. Deletes the `Peer`
/// row before notifying the agent, per §4.1's ordering guarantee.
pub async fn remove_peer(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(public_key): Path<String>,
    Query(query): Query<RemovePeerQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    require_scope(&ctx, Scope::Write)?;

    let machine = state
        .store
        .get_machine(query.machine_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("machine".into()))?;

    let peer = state
        .store
        .delete_peer_by_public_key(query.machine_id, &public_key)
        .await?
        .ok_or_else(|| ApiError::NotFound("peer".into()))?;

    if let Some(env) = state.store.get_environment(peer.environment_id).await? {
        if env.team_id != ctx.team_id {
            return Err(ApiError::NotFound("peer".into()));
        }
    }

    let host = machine.public_ip.ip().to_string();
    if let Err(err) = state
        .agent_client
        .remove_peer(&host, &public_key)
        .await
    {
        tracing::warn!(
            machine_id = %machine.id,
            public_key = %public_key,
            error = %err,
            "agent unreachable while removing peer; reconciler will retry"
        );
    }

    Ok(Json(serde_json::json!({"removed": true})))
}

/// `GET /v1/wireguard/status/{environment_id}`.
pub async fn status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(environment_id): Path<Uuid>,
) -> ApiResult<Json<WireguardStatusDto>> {
    require_scope(&ctx, Scope::Read)?;

    let env = state
        .store
        .get_environment(environment_id)
        .await?
        .filter(|e| e.team_id == ctx.team_id)
        .ok_or_else(|| ApiError::NotFound("environment".into()))?;

    let peers = state.store.list_peers_for_environment(env.id).await?;
    Ok(Json(WireguardStatusDto {
        environment_id: env.id.to_string(),
        peers: peers.iter().map(peer_to_dto).collect(),
    }))
}
