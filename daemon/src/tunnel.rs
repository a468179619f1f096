//! # Workstation Tunnel Interface (§4.6, §9's "polymorphism over tunnel
//! backends")
//!
//! The capability set spec §9 asks for, split exactly the way it names
//! them: `{create, destroy, set_up, add_address, add_route}` for interface
//! lifecycle and `{configure, add_peer, remove_peer, get_peers}` for peer
//! management. `WgQuickInterface` is the one concrete (kernel-module)
//! implementation this crate ships; a userspace TUN backend would
//! implement the same trait and is the reason `create` returns the
//! interface's *actual* name rather than assuming it matches what was
//! requested (spec §4.6: "the created interface name may differ from the
//! requested one on userspace backends").

use async_trait::async_trait;
use cilo_protocol::agent::AgentPeerInfo;
use ipnet::Ipv4Net;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait TunnelInterface: Send + Sync {
    /// Creates the interface, returning its actual name.
    async fn create(&self, requested_name: &str) -> Result<String, TunnelError>;

    /// Sets the private key, listen port and address on an already-created
    /// interface.
    async fn configure(
        &self,
        iface: &str,
        private_key: &str,
        listen_port: u16,
        address: &str,
    ) -> Result<(), TunnelError>;

    /// Adds (or replaces) the peer entry for the server, with a persistent
    /// keepalive for NAT traversal (spec §4.6: 25s).
    async fn add_peer(
        &self,
        iface: &str,
        public_key: &str,
        endpoint: &str,
        allowed_ips: &[Ipv4Net],
        keepalive_s: u16,
    ) -> Result<(), TunnelError>;

    async fn remove_peer(&self, iface: &str, public_key: &str) -> Result<(), TunnelError>;

    /// Installs a route for `cidr` via the interface. Callers skip `/32`s
    /// themselves (§4.6: implicit host routes from the peer entry).
    async fn add_route(&self, iface: &str, cidr: &Ipv4Net) -> Result<(), TunnelError>;

    async fn set_up(&self, iface: &str) -> Result<(), TunnelError>;

    async fn destroy(&self, iface: &str) -> Result<(), TunnelError>;

    async fn get_peers(&self, iface: &str) -> Result<Vec<AgentPeerInfo>, TunnelError>;
}

/// Drives a kernel WireGuard interface directly via `ip`/`wg`, the way the
/// Host Provisioner (`cilo-server::provisioner`) brings up the *machine*
/// side of the same interface over SSH — this is the workstation-local
/// equivalent of those same commands.
pub struct WgQuickInterface;

impl WgQuickInterface {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, TunnelError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| TunnelError::Command(e.to_string()))?;
        if !output.status.success() {
            return Err(TunnelError::Command(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// `wg set <iface> private-key /dev/stdin` needs the key piped in
    /// rather than passed as an argument, so it never shows up in `ps`.
    async fn set_private_key(&self, iface: &str, private_key: &str) -> Result<(), TunnelError> {
        let mut child = Command::new("wg")
            .args(["set", iface, "private-key", "/dev/stdin"])
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| TunnelError::Command(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(private_key.as_bytes())
                .await
                .map_err(|e| TunnelError::Command(e.to_string()))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| TunnelError::Command(e.to_string()))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| TunnelError::Command(e.to_string()))?;
        if !status.success() {
            return Err(TunnelError::Command("wg set private-key failed".into()));
        }
        Ok(())
    }
}

impl Default for WgQuickInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelInterface for WgQuickInterface {
    async fn create(&self, requested_name: &str) -> Result<String, TunnelError> {
        self.run("ip", &["link", "add", "dev", requested_name, "type", "wireguard"])
            .await?;
        Ok(requested_name.to_string())
    }

    async fn configure(
        &self,
        iface: &str,
        private_key: &str,
        listen_port: u16,
        address: &str,
    ) -> Result<(), TunnelError> {
        self.set_private_key(iface, private_key).await?;
        self.run("wg", &["set", iface, "listen-port", &listen_port.to_string()])
            .await?;
        self.run("ip", &["address", "add", address, "dev", iface])
            .await?;
        Ok(())
    }

    async fn add_peer(
        &self,
        iface: &str,
        public_key: &str,
        endpoint: &str,
        allowed_ips: &[Ipv4Net],
        keepalive_s: u16,
    ) -> Result<(), TunnelError> {
        let ips = allowed_ips
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.run(
            "wg",
            &[
                "set",
                iface,
                "peer",
                public_key,
                "endpoint",
                endpoint,
                "allowed-ips",
                &ips,
                "persistent-keepalive",
                &keepalive_s.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn remove_peer(&self, iface: &str, public_key: &str) -> Result<(), TunnelError> {
        self.run("wg", &["set", iface, "peer", public_key, "remove"])
            .await?;
        Ok(())
    }

    async fn add_route(&self, iface: &str, cidr: &Ipv4Net) -> Result<(), TunnelError> {
        self.run("ip", &["route", "add", &cidr.to_string(), "dev", iface])
            .await?;
        Ok(())
    }

    async fn set_up(&self, iface: &str) -> Result<(), TunnelError> {
        self.run("ip", &["link", "set", "up", "dev", iface]).await?;
        Ok(())
    }

    async fn destroy(&self, iface: &str) -> Result<(), TunnelError> {
        self.run("ip", &["link", "delete", "dev", iface]).await?;
        Ok(())
    }

    async fn get_peers(&self, iface: &str) -> Result<Vec<AgentPeerInfo>, TunnelError> {
        let dump = self.run("wg", &["show", iface, "dump"]).await?;
        Ok(parse_wg_dump(&dump))
    }
}

/// Parses `wg show <iface> dump`, skipping the interface's own header line
/// (identical shape to `cilo_agent::tunnel::parse_wg_dump` — duplicated
/// rather than shared because the daemon and agent are separate deployment
/// targets with no common runtime crate, per §9).
fn parse_wg_dump(dump: &str) -> Vec<AgentPeerInfo> {
    let mut peers = Vec::new();
    for (i, line) in dump.lines().enumerate() {
        if i == 0 {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 7 {
            continue;
        }
        let public_key = cols[0].to_string();
        let allowed_ips = cols[3]
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        let last_handshake_s = cols[4]
            .parse::<u64>()
            .ok()
            .filter(|&t| t > 0)
            .map(|handshake_unix| {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                now.saturating_sub(handshake_unix)
            });
        peers.push(AgentPeerInfo {
            public_key,
            allowed_ips,
            last_handshake_s,
        });
    }
    peers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dump_output_skipping_the_interface_line() {
        let dump = "PRIVKEY\t51820\t(none)\t(none)\t0\t0\t0\toff\n\
                     SERVERPK\t203.0.113.1:51820\t203.0.113.1:51820\t10.225.0.0/16,10.224.1.0/24\t1690000000\t100\t200\toff";
        let peers = parse_wg_dump(dump);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].public_key, "SERVERPK");
        assert_eq!(peers[0].allowed_ips.len(), 2);
        assert!(peers[0].last_handshake_s.is_some());
    }
}
