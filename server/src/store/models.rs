//! Row types for the tables named in spec §3/§6. One `FromRow` struct per
//! table; wire DTOs (in `cilo-protocol`) are derived from these by the API
//! handlers, never the other way around, so secret columns (`key_hash`)
//! never leak into a response by accident.

use chrono::{DateTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TeamRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub key_hash: String,
    pub prefix: String,
    pub scope: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MachineRow {
    pub id: Uuid,
    pub provider_id: String,
    pub provider_type: String,
    pub public_ip: IpNetwork,
    pub wg_public_key: Option<String>,
    pub wg_endpoint: Option<String>,
    pub status: String,
    pub assigned_env: Option<Uuid>,
    pub ssh_host: String,
    pub ssh_user: String,
    pub region: String,
    pub size: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnvironmentRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub project: String,
    pub format: String,
    pub machine_id: Option<Uuid>,
    pub status: String,
    pub subnet: IpNetwork,
    pub services: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct PeerRow {
    pub id: Uuid,
    pub machine_id: Uuid,
    pub environment_id: Uuid,
    pub user_id: Option<String>,
    pub public_key: String,
    pub assigned_ip: IpNetwork,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageRecordRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub environment_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_sec: Option<i64>,
}
