//! # Control-Plane → Agent Client
//!
//! Thin `reqwest` wrapper for the handful of agent endpoints the control
//! plane calls directly (§4.1, §4.3). Bounded to a 5s timeout per §5 so a
//! stuck agent never stalls the `/v1/wireguard/exchange` request path.
//!
//! §4.1 describes reaching the agent at its overlay IP "or fall back to the
//! public IP on initial setup", but §3's `Machine` row carries no separate
//! overlay-mesh address field — `wg_endpoint` is `public_ip:51820`, the same
//! host the agent's own HTTP port is reachable on. So there is only ever one
//! address to dial here; it's named `host` rather than threading a
//! since-redundant `overlay_ip` override through every call site.

use cilo_protocol::agent::{AddPeerRequest, AgentHealthResponse, AgentPeerInfo, WireguardStatusResponse};
use std::time::Duration;

const AGENT_PORT: u16 = 8080;
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum AgentClientError {
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("agent returned {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("failed to build agent http client");
        Self { http }
    }

    fn base_url(&self, host: &str) -> String {
        format!("http://{host}:{AGENT_PORT}")
    }

    pub async fn add_peer(
        &self,
        host: &str,
        public_key: &str,
        allowed_ips: &str,
    ) -> Result<(), AgentClientError> {
        let url = format!("{}/wireguard/add-peer", self.base_url(host));
        let resp = self
            .http
            .post(url)
            .json(&AddPeerRequest {
                public_key: public_key.to_string(),
                allowed_ips: allowed_ips.to_string(),
            })
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AgentClientError::Status(resp.status()))
        }
    }

    pub async fn remove_peer(&self, host: &str, public_key: &str) -> Result<(), AgentClientError> {
        let url = format!("{}/wireguard/remove-peer/{}", self.base_url(host), public_key);
        let resp = self.http.delete(url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AgentClientError::Status(resp.status()))
        }
    }

    pub async fn list_peers(&self, host: &str) -> Result<Vec<AgentPeerInfo>, AgentClientError> {
        let url = format!("{}/wireguard/status", self.base_url(host));
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(AgentClientError::Status(resp.status()));
        }
        Ok(resp.json::<WireguardStatusResponse>().await?.peers)
    }

    pub async fn health(&self, host: &str) -> Result<AgentHealthResponse, AgentClientError> {
        let url = format!("{}/health", self.base_url(host));
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(AgentClientError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }
}

impl Default for AgentClient {
    fn default() -> Self {
        Self::new()
    }
}
