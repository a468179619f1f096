//! `/v1/environments` handlers (§4.1).

use crate::auth::{require_scope, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::environments::{CreateEnvironmentError, EnvironmentStatus, NewEnvironment};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cilo_protocol::control::{CreateEnvironmentRequest, EnvironmentDto, EnvironmentStatus as DtoStatus};
use uuid::Uuid;

fn to_dto(row: &crate::store::models::EnvironmentRow) -> EnvironmentDto {
    let status = match row.status.as_str() {
        "pending" => DtoStatus::Pending,
        "provisioning" => DtoStatus::Provisioning,
        "ready" => DtoStatus::Ready,
        "error" => DtoStatus::Error,
        _ => DtoStatus::Destroyed,
    };
    EnvironmentDto {
        id: row.id.to_string(),
        team_id: row.team_id.to_string(),
        name: row.name.clone(),
        project: row.project.clone(),
        format: row.format.clone(),
        machine_id: row.machine_id.map(|id| id.to_string()),
        status,
        subnet: row.subnet.to_string(),
        services: row.services.clone(),
        created_at: row.created_at.to_rfc3339(),
        created_by: row.created_by.clone(),
        source: row.source.clone(),
    }
}

/// `POST /v1/environments`. Creates the row, asks the pool for a machine,
/// and returns immediately with `status=provisioning` — the provisioner
/// drives the rest asynchronously (§4.1's environment-creation paragraph).
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateEnvironmentRequest>,
) -> ApiResult<Json<EnvironmentDto>> {
    require_scope(&ctx, cilo_protocol::control::Scope::Write)?;

    if req.name.trim().is_empty() || req.project.trim().is_empty() || req.format.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "name, project and format are required".into(),
        ));
    }

    let env = state
        .store
        .create_environment(NewEnvironment {
            team_id: ctx.team_id,
            name: req.name,
            project: req.project,
            format: req.format,
            services: req.services,
            created_by: ctx.key_id.to_string(),
            source: req.source,
        })
        .await
        .map_err(|e| match e {
            CreateEnvironmentError::NameConflict => {
                ApiError::Conflict("environment name already used in this team".into())
            }
            CreateEnvironmentError::SubnetExhausted => {
                ApiError::Exhausted("container subnet exhausted".into())
            }
            CreateEnvironmentError::Database(e) => ApiError::Database(e),
        })?;

    match state.pool.assign(env.id).await {
        Ok(machine_id) => {
            state.store.set_environment_machine(env.id, machine_id).await?;
            state.store.start_usage(ctx.team_id, env.id).await?;
        }
        Err(err) => {
            state
                .store
                .set_environment_status(env.id, EnvironmentStatus::Error)
                .await?;
            tracing::error!(environment_id = %env.id, error = %err, "failed to assign a machine");
            return Err(ApiError::Exhausted(
                "no machine available for this environment".into(),
            ));
        }
    }

    let env = state
        .store
        .get_environment(env.id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("environment vanished after creation")))?;

    Ok(Json(to_dto(&env)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<EnvironmentDto>>> {
    require_scope(&ctx, cilo_protocol::control::Scope::Read)?;
    let envs = state.store.list_environments(ctx.team_id).await?;
    Ok(Json(envs.iter().map(to_dto).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnvironmentDto>> {
    require_scope(&ctx, cilo_protocol::control::Scope::Read)?;
    let env = state
        .store
        .get_environment(id)
        .await?
        .filter(|e| e.team_id == ctx.team_id)
        .ok_or_else(|| ApiError::NotFound("environment".into()))?;
    Ok(Json(to_dto(&env)))
}

/// `DELETE /v1/environments/{id}`. Tears down peers, releases the machine,
/// marks the environment `destroyed`, and closes its usage record.
pub async fn teardown(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnvironmentDto>> {
    require_scope(&ctx, cilo_protocol::control::Scope::Write)?;

    let env = state
        .store
        .get_environment(id)
        .await?
        .filter(|e| e.team_id == ctx.team_id)
        .ok_or_else(|| ApiError::NotFound("environment".into()))?;

    state.store.delete_peers_for_environment(env.id).await?;

    if let Some(machine_id) = env.machine_id {
        if let Err(err) = state.pool.release(machine_id).await {
            tracing::warn!(machine_id = %machine_id, error = %err, "failed to release machine during teardown");
        }
    }

    state
        .store
        .set_environment_status(env.id, EnvironmentStatus::Destroyed)
        .await?;
    state.store.end_usage(env.id).await?;

    let env = state
        .store
        .get_environment(env.id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("environment vanished during teardown")))?;

    Ok(Json(to_dto(&env)))
}
