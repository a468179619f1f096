//! Control-plane HTTP/JSON DTOs (§4.1, §3 of the spec). These mirror the
//! store's row shapes but never carry secret material (`key_hash`, private
//! keys) — the store types that do live in `cilo-server::store`.

use serde::{Deserialize, Serialize};

/// API key scope, from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

impl Scope {
    /// True if `self` meets or exceeds `required`.
    pub fn satisfies(self, required: Scope) -> bool {
        self >= required
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Provisioning,
    Ready,
    Assigned,
    Destroying,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    Pending,
    Provisioning,
    Ready,
    Error,
    Destroyed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDto {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCreatedDto {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub scope: Scope,
    pub prefix: String,
    /// The cleartext key. Present ONLY in the create response — never
    /// reconstructable afterwards.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyDto {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub scope: Scope,
    pub prefix: String,
    pub created_at: String,
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDto {
    pub id: String,
    pub provider_id: String,
    pub provider_type: String,
    pub public_ip: String,
    pub wg_public_key: Option<String>,
    pub wg_endpoint: Option<String>,
    pub status: MachineStatus,
    pub assigned_env: Option<String>,
    pub region: String,
    pub size: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineListDto {
    pub machines: Vec<MachineDto>,
    pub ready_count: usize,
    pub assigned_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMachineRequest {
    pub provider_id: String,
    pub public_ip: String,
    pub ssh_host: String,
    pub ssh_user: String,
    pub region: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDto {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub project: String,
    pub format: String,
    pub machine_id: Option<String>,
    pub status: EnvironmentStatus,
    pub subnet: String,
    pub services: Vec<String>,
    pub created_at: String,
    pub created_by: String,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    pub project: String,
    pub format: String,
    pub source: String,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDto {
    pub id: String,
    pub machine_id: String,
    pub environment_id: String,
    pub user_id: Option<String>,
    pub public_key: String,
    pub assigned_ip: String,
    pub connected_at: String,
    pub last_seen: Option<String>,
}

/// `POST /v1/wireguard/exchange` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    pub environment_id: String,
    pub user_id: Option<String>,
    pub public_key: String,
    pub machine_id: String,
}

/// `POST /v1/wireguard/exchange` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeResponse {
    pub machine_public_key: String,
    pub endpoint: String,
    pub assigned_ip: String,
    /// Ordered `[assigned_ip/32, environment_subnet, overlay_subnet]` — the
    /// workstation installs routes in exactly this order (§4.1).
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireguardStatusDto {
    pub environment_id: String,
    pub peers: Vec<PeerDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_s: u64,
}
