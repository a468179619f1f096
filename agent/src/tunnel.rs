//! # Tunnel Backend (§4.5, §9's "polymorphism over tunnel backends")
//!
//! The agent owns one tunnel interface. `TunnelBackend` is the seam between
//! that fact and the actual OS primitive — a kernel WireGuard interface on
//! one platform, a userspace implementation on another — mirroring the
//! `WireGuardInterface`/`WireGuardManager` split used for the same problem
//! in the broader tunnel-tooling ecosystem this crate draws from.
//!
//! Adding a peer is set-semantic: re-posting the same public key replaces
//! its allowed-IP set rather than unioning with the previous one (spec
//! §4.5, §8's idempotence property). `wg set <iface> peer <key> allowed-ips
//! <list>` already has this replace semantics, so [`WgQuickBackend`] gets it
//! for free from the underlying tool.

use async_trait::async_trait;
use cilo_protocol::agent::AgentPeerInfo;
use ipnet::Ipv4Net;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel command failed: {0}")]
    Command(String),
    #[error("peer not found: {0}")]
    PeerNotFound(String),
}

#[async_trait]
pub trait TunnelBackend: Send + Sync {
    /// Adds or replaces a peer's allowed-IP set.
    async fn add_peer(&self, public_key: &str, allowed_ips: &[Ipv4Net]) -> Result<(), TunnelError>;

    /// Removes a peer. Idempotent: removing an absent peer is not an error.
    async fn remove_peer(&self, public_key: &str) -> Result<(), TunnelError>;

    /// Every peer currently configured on the interface, with handshake age.
    async fn list_peers(&self) -> Result<Vec<AgentPeerInfo>, TunnelError>;
}

/// Drives an already-configured `wg-quick` interface (the provisioner
/// brings the interface up at bootstrap — see `cilo-server::provisioner`
/// step 5 — this backend only ever manages peers on top of it).
pub struct WgQuickBackend {
    interface: String,
}

impl WgQuickBackend {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TunnelError> {
        let output = Command::new("wg")
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
}

#[async_trait]
impl TunnelBackend for WgQuickBackend {
    async fn add_peer(&self, public_key: &str, allowed_ips: &[Ipv4Net]) -> Result<(), TunnelError> {
        let ips = allowed_ips
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.run(&[
            "set",
            &self.interface,
            "peer",
            public_key,
            "allowed-ips",
            &ips,
            "persistent-keepalive",
            "25",
        ])
        .await?;
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<(), TunnelError> {
        self.run(&["set", &self.interface, "peer", public_key, "remove"])
            .await?;
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<AgentPeerInfo>, TunnelError> {
        let dump = self.run(&["show", &self.interface, "dump"]).await?;
        parse_wg_dump(&dump)
    }
}

/// Parses `wg show <iface> dump` output. The first line (the interface
/// itself) has a different column count than the peer lines that follow,
/// so it's skipped.
fn parse_wg_dump(dump: &str) -> Result<Vec<AgentPeerInfo>, TunnelError> {
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
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dump_output_skipping_the_interface_line() {
        let dump = "PRIVKEY\t51820\t(none)\t(none)\t0\t0\t0\toff\n\
                     PUBKEY1\t(none)\t198.51.100.1:51820\t10.225.0.1/32\t1690000000\t100\t200\toff";
        let peers = parse_wg_dump(dump).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].public_key, "PUBKEY1");
        assert_eq!(peers[0].allowed_ips, vec!["10.225.0.1/32".to_string()]);
        assert!(peers[0].last_handshake_s.is_some());
    }

    #[test]
    fn parses_dump_with_no_peers() {
        let dump = "PRIVKEY\t51820\t(none)\t(none)\t0\t0\t0\toff";
        assert!(parse_wg_dump(dump).unwrap().is_empty());
    }
}
