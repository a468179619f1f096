//! `/v1/machines` handlers (§4.1). All admin-scoped: manual machine
//! registration is the escape hatch for operating without a `CloudProvider`
//! wired up (spec §4.4's provisioner still drives bootstrap over SSH).

use crate::auth::{require_scope, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::machines::{MachineStatus as StoreMachineStatus, NewMachine};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cilo_protocol::control::{
    MachineDto, MachineListDto, MachineStatus as DtoMachineStatus, RegisterMachineRequest, Scope,
};
use std::str::FromStr;
use uuid::Uuid;

fn to_dto(row: &crate::store::models::MachineRow) -> MachineDto {
    let status = match row.status.as_str() {
        "provisioning" => DtoMachineStatus::Provisioning,
        "ready" => DtoMachineStatus::Ready,
        "assigned" => DtoMachineStatus::Assigned,
        "destroying" => DtoMachineStatus::Destroying,
        _ => DtoMachineStatus::Failed,
    };
    MachineDto {
        id: row.id.to_string(),
        provider_id: row.provider_id.clone(),
        provider_type: row.provider_type.clone(),
        public_ip: row.public_ip.ip().to_string(),
        wg_public_key: row.wg_public_key.clone(),
        wg_endpoint: row.wg_endpoint.clone(),
        status,
        assigned_env: row.assigned_env.map(|id| id.to_string()),
        region: row.region.clone(),
        size: row.size.clone(),
        created_at: row.created_at.to_rfc3339(),
    }
}

/// `POST /v1/machines`. Registers the row as `provisioning` and drives the
/// host bootstrap over SSH in the background, the same sequence the pool
/// runs for cloud-provisioned capacity, just without a `CloudProvider::create`
/// call up front.
pub async fn register(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<RegisterMachineRequest>,
) -> ApiResult<Json<MachineDto>> {
    require_scope(&ctx, Scope::Admin)?;

    let public_ip = std::net::IpAddr::from_str(&req.public_ip)
        .map_err(|_| ApiError::BadRequest("public_ip is not a valid IP address".into()))?;

    let row = state
        .store
        .register_machine(NewMachine {
            provider_id: req.provider_id,
            provider_type: "manual".into(),
            public_ip,
            ssh_host: req.ssh_host,
            ssh_user: req.ssh_user,
            region: req.region,
            size: req.size,
        })
        .await?;

    let store = state.store.clone();
    let provisioner = state.provisioner.clone();
    let machine_id = row.id;
    tokio::spawn(async move {
        let machine = match store.get_machine(machine_id).await {
            Ok(Some(m)) => m,
            _ => return,
        };
        match provisioner.provision(&store, &machine).await {
            Ok(()) => {
                if let Err(err) = store
                    .set_machine_status(machine_id, StoreMachineStatus::Ready)
                    .await
                {
                    tracing::error!(machine_id = %machine_id, error = %err, "failed to mark machine ready");
                }
            }
            Err(err) => {
                tracing::error!(machine_id = %machine_id, error = %err, "manual machine provisioning failed");
                let _ = store
                    .set_machine_status(machine_id, StoreMachineStatus::Failed)
                    .await;
            }
        }
    });

    Ok(Json(to_dto(&row)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<MachineListDto>> {
    require_scope(&ctx, Scope::Admin)?;
    let rows = state.store.list_machines().await?;

    let ready_count = rows.iter().filter(|m| m.status == "ready").count();
    let assigned_count = rows.iter().filter(|m| m.status == "assigned").count();
    let failed_count = rows.iter().filter(|m| m.status == "failed").count();

    Ok(Json(MachineListDto {
        machines: rows.iter().map(to_dto).collect(),
        ready_count,
        assigned_count,
        failed_count,
    }))
}

/// `POST /v1/machines/{id}/health` — supplemented operational endpoint: asks
/// the provisioner to probe the machine right now rather than waiting for
/// the pool's periodic `HealthCheckAll` pass, and reflects the observed
/// state into `machines.status`.
pub async fn report_health(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MachineDto>> {
    require_scope(&ctx, Scope::Admin)?;

    let machine = state
        .store
        .get_machine(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("machine".into()))?;

    if state.provisioner.probe_health(&machine).await.is_err() && machine.status == "ready" {
        state
            .store
            .set_machine_status(id, StoreMachineStatus::Failed)
            .await?;
    }

    let machine = state
        .store
        .get_machine(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("machine".into()))?;
    Ok(Json(to_dto(&machine)))
}
