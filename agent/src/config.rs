//! Agent settings, loaded the same way `cilo-server` loads its own: a
//! file (`cilo-agent.toml`, optional) layered under `CILO_`-prefixed
//! environment variables (spec §6: "Environment variables consumed by the
//! core" — the agent's own environment file is written by the provisioner
//! at bootstrap, see `cilo-server::provisioner`).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub machine_id: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_interface() -> String {
    "wg0".to_string()
}

fn default_workspace_root() -> String {
    "/var/lib/cilo/envs".to_string()
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("/opt/cilo/config/agent").required(false))
            .add_source(config::Environment::with_prefix("CILO").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_everything_but_machine_id() {
        assert_eq!(default_listen_addr(), "0.0.0.0:8080");
        assert_eq!(default_interface(), "wg0");
        assert_eq!(default_workspace_root(), "/var/lib/cilo/envs");
    }
}
