//! # Workstation Tunnel Daemon (§4.6)
//!
//! Brings up the local tunnel interface from a persisted [`DaemonConfig`],
//! installs the server as the sole peer with a keepalive, installs routes
//! for every non-`/32` allowed CIDR, and persists a [`DaemonState`] after
//! every transition.

use crate::error::DaemonError;
use crate::models::{DaemonConfig, DaemonState};
use crate::persist::PersistDir;
use crate::tunnel::TunnelInterface;
use chrono::Utc;
use ipnet::Ipv4Net;
use std::sync::Arc;
use tokio::sync::Mutex;

/// NAT-traversal keepalive interval (§4.6).
const KEEPALIVE_S: u16 = 25;

pub struct Daemon {
    persist: PersistDir,
    tunnel: Arc<dyn TunnelInterface>,
    config: DaemonConfig,
    /// The interface's actual name, populated once `start()` succeeds. May
    /// differ from `config.interface` on a userspace backend.
    actual_interface: Mutex<Option<String>>,
}

impl Daemon {
    pub fn new(persist: PersistDir, tunnel: Arc<dyn TunnelInterface>, config: DaemonConfig) -> Self {
        Self {
            persist,
            tunnel,
            config,
            actual_interface: Mutex::new(None),
        }
    }

    pub fn environment_id(&self) -> &str {
        &self.config.environment_id
    }

    /// Creates the interface, configures it, adds the server peer, and
    /// installs routes — then persists `running: true`.
    pub async fn start(&self) -> Result<(), DaemonError> {
        let iface = self.tunnel.create(&self.config.interface).await?;
        self.tunnel
            .configure(
                &iface,
                &self.config.private_key,
                self.config.listen_port,
                &self.config.address,
            )
            .await?;

        let allowed: Vec<Ipv4Net> = self
            .config
            .allowed_ips
            .iter()
            .filter_map(|s| match s.parse::<Ipv4Net>() {
                Ok(net) => Some(net),
                Err(_) => {
                    tracing::warn!(cidr = %s, "skipping unparseable allowed_ips entry");
                    None
                }
            })
            .collect();

        self.tunnel
            .add_peer(
                &iface,
                &self.config.server_pub_key,
                &self.config.server_endpoint,
                &allowed,
                KEEPALIVE_S,
            )
            .await?;

        // /32s are implicit host routes from the peer entry itself (§4.6).
        for net in allowed.iter().filter(|n| n.prefix_len() != 32) {
            self.tunnel.add_route(&iface, net).await?;
        }

        self.tunnel.set_up(&iface).await?;

        *self.actual_interface.lock().await = Some(iface.clone());

        let pid = std::process::id();
        self.persist.write_pid(pid)?;
        self.persist.write_state(&DaemonState {
            running: true,
            pid: Some(pid),
            interface: iface,
            address: self.config.address.clone(),
            environment_id: self.config.environment_id.clone(),
            started_at: Some(Utc::now()),
        })?;

        Ok(())
    }

    /// Tears down the interface and persists `running: false`. Does not
    /// remove the control socket — the acceptor loop owns that (spec §4.6:
    /// "close the listener, tear down the tunnel interface, overwrite
    /// state... remove the socket file", in that order).
    pub async fn stop(&self) -> Result<(), DaemonError> {
        let iface = self.actual_interface.lock().await.take();
        if let Some(iface) = &iface {
            self.tunnel.destroy(iface).await?;
        }

        let previous = DaemonState {
            running: true,
            pid: None,
            interface: iface.unwrap_or_default(),
            address: self.config.address.clone(),
            environment_id: self.config.environment_id.clone(),
            started_at: None,
        };
        self.persist.write_state(&DaemonState::stopped(&previous))?;
        self.persist.remove_pid();

        Ok(())
    }

    /// JSON status including live peer stats, for the control socket's
    /// `"status"` command.
    pub async fn status_json(&self) -> String {
        let iface = self.actual_interface.lock().await.clone();
        let peers = match &iface {
            Some(iface) => self.tunnel.get_peers(iface).await.unwrap_or_default(),
            None => Vec::new(),
        };
        let body = serde_json::json!({
            "running": iface.is_some(),
            "interface": iface,
            "environment_id": self.config.environment_id,
            "address": self.config.address,
            "peers": peers,
        });
        serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
    }
}
