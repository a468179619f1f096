//! # Server Settings
//!
//! Layered configuration, the way `Vanopticon-Heimdall`'s `src/config/mod.rs`
//! builds its settings struct: a base file (optional, `cilo-server.toml` in
//! the working directory) overridden by `CILO_`-prefixed environment
//! variables. This is deliberately not a CLI argument parser — the
//! human-facing `cilo-server` command line is out of scope (spec §1); this
//! struct is what that external driver would hand to the library entry
//! point, and what `main()` builds directly when run without one.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP API listens on, e.g. "0.0.0.0:8000".
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Minimum number of `ready` machines the pool maintains.
    #[serde(default = "default_min_ready")]
    pub min_ready: usize,

    /// Maximum number of machines the pool will ever hold.
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// SSH private key path used by the host provisioner. Overridable via
    /// `CILO_SSH_KEY_PATH` per spec §6.
    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,

    /// URL the provisioner fetches the agent binary from.
    pub agent_binary_url: String,

    /// Seconds to wait for an outbound agent call before giving up (§5).
    #[serde(default = "default_agent_call_timeout_s")]
    pub agent_call_timeout_s: u64,

    #[serde(default = "default_pool_reconcile_interval_s")]
    pub pool_reconcile_interval_s: u64,

    #[serde(default = "default_peer_sync_interval_s")]
    pub peer_sync_interval_s: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_min_ready() -> usize {
    1
}
fn default_max_total() -> usize {
    10
}
fn default_ssh_key_path() -> String {
    "~/.ssh/id_ed25519".to_string()
}
fn default_agent_call_timeout_s() -> u64 {
    5
}
fn default_pool_reconcile_interval_s() -> u64 {
    30
}
fn default_peer_sync_interval_s() -> u64 {
    15
}

impl Settings {
    /// Loads settings from an optional `cilo-server.toml` plus environment
    /// overrides (`CILO_DATABASE_URL`, `CILO_LISTEN_ADDR`, `CILO_MIN_READY`,
    /// ...). `CILO_SSH_KEY_PATH` is read directly, matching the bare
    /// (non-double-underscore) environment variable name spec §6 names
    /// explicitly.
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("cilo-server").required(false))
            .add_source(
                config::Environment::with_prefix("CILO")
                    .separator("_")
                    .try_parsing(true),
            );

        if let Ok(key_path) = std::env::var("CILO_SSH_KEY_PATH") {
            builder = builder.set_override("ssh_key_path", key_path)?;
        }

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(default_listen_addr(), "0.0.0.0:8000");
        assert!(default_min_ready() <= default_max_total());
    }
}
