//! Supplemented admin endpoints: team and API-key management. Spec §4.1
//! lists key-exchange and pool routes in detail but only says teams/keys
//! are "created by an administrative command" (§3) without naming a wire
//! shape — this supplements that with plain admin-scoped REST endpoints so
//! the control plane is operable without a separate offline tool.

use crate::auth::{require_scope, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::api_keys::parse_scope;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cilo_protocol::control::{ApiKeyCreatedDto, Scope, TeamDto};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<Json<TeamDto>> {
    require_scope(&ctx, Scope::Admin)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    let team = state.store.create_team(&req.name).await?;
    Ok(Json(TeamDto {
        id: team.id.to_string(),
        name: team.name,
        created_at: team.created_at.to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub scope: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<CreateKeyRequest>,
) -> ApiResult<Json<ApiKeyCreatedDto>> {
    require_scope(&ctx, Scope::Admin)?;

    state
        .store
        .get_team(team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("team".into()))?;

    let scope = parse_scope(&req.scope)
        .ok_or_else(|| ApiError::BadRequest("scope must be read, write or admin".into()))?;

    let issued = state.store.create_api_key(team_id, &req.name, scope).await?;

    Ok(Json(ApiKeyCreatedDto {
        id: issued.row.id.to_string(),
        team_id: issued.row.team_id.to_string(),
        name: issued.row.name,
        scope,
        prefix: issued.row.prefix,
        key: issued.cleartext,
    }))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require_scope(&ctx, Scope::Admin)?;
    let deleted = state.store.delete_api_key(id).await?;
    if !deleted {
        return Err(ApiError::NotFound("api key".into()));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}
