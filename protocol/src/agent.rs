//! On-machine agent HTTP/JSON DTOs (§4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct AgentHealthResponse {
    pub status: &'static str,
    pub machine_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentUpRequest {
    pub workspace_path: String,
    pub env_name: String,
    pub subnet: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentDownRequest {
    pub env_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Running,
    Stopped,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatusResponse {
    pub env_name: String,
    pub services: Vec<ServiceStatus>,
}

/// `POST /wireguard/add-peer` request body. `allowed_ips` is a
/// comma-separated list of CIDRs, matching the agent's REST contract in
/// §4.5 (not a JSON array, to match the literal field description there).
#[derive(Debug, Clone, Deserialize)]
pub struct AddPeerRequest {
    pub public_key: String,
    pub allowed_ips: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPeerInfo {
    pub public_key: String,
    pub allowed_ips: Vec<String>,
    pub last_handshake_s: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireguardStatusResponse {
    pub peers: Vec<AgentPeerInfo>,
}
