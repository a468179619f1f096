//! Persisted wire shapes for the workstation daemon (§4.6, §6). Field
//! names match the JSON the spec names literally so `config.json`/
//! `state.json` are directly inspectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Loaded once at daemon startup; never mutated in place — a config change
/// means writing a new file and restarting the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub interface: String,
    pub private_key: String,
    /// CIDR, e.g. `"10.225.0.12/32"`.
    pub address: String,
    pub listen_port: u16,
    pub server_pub_key: String,
    pub server_endpoint: String,
    pub allowed_ips: Vec<String>,
    pub environment_id: String,
}

/// Runtime state the daemon persists on every transition (spec §4.6).
/// `started_at` and `pid` are the only fields a restart is expected to
/// change — everything else should round-trip identically given the same
/// config (spec §8's daemon-lifecycle idempotence property).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonState {
    pub running: bool,
    pub pid: Option<u32>,
    /// The interface's actual name. May differ from `DaemonConfig::interface`
    /// on a userspace TUN backend (§4.6).
    pub interface: String,
    pub address: String,
    pub environment_id: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl DaemonState {
    pub fn stopped(previous: &DaemonState) -> Self {
        Self {
            running: false,
            pid: None,
            interface: previous.interface.clone(),
            address: previous.address.clone(),
            environment_id: previous.environment_id.clone(),
            started_at: None,
        }
    }
}
