//! # Daemon State Directory (§6)
//!
//! `~/.cilo/tunnel/` by default, holding `config.json`, `state.json`,
//! `daemon.pid`, `daemon.sock` and `daemon.log`. Every JSON write uses the
//! "write temp, fsync, rename" pattern (spec §5) via `tempfile`, the same
//! way `astrid-tools::spark` persists its config file in the retrieved
//! corpus, and holds an advisory exclusive lock (`fs2::FileExt`, as
//! `astrid-plugins::lockfile` uses for its own lockfile) on a dedicated
//! `.lock` file for the duration of the mutation.

use crate::models::{DaemonConfig, DaemonState};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PersistDir {
    root: PathBuf,
}

impl PersistDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.cilo/tunnel/`, falling back to `/tmp` if the home directory
    /// can't be resolved.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".cilo/tunnel")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }
    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }
    pub fn pid_path(&self) -> PathBuf {
        self.root.join("daemon.pid")
    }
    pub fn socket_path(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }
    pub fn log_path(&self) -> PathBuf {
        self.root.join("daemon.log")
    }
    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    fn write_json_atomic<T: serde::Serialize>(
        &self,
        path: &Path,
        value: &T,
        mode: u32,
    ) -> anyhow::Result<()> {
        self.ensure_dir()?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path())?;
        lock_file.lock_exclusive()?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(mode))?;
        }

        tmp.persist(path)
            .map_err(|e| anyhow::anyhow!("failed to persist {}: {}", path.display(), e.error))?;

        FileExt::unlock(&lock_file)?;
        Ok(())
    }

    /// Mode 0600: `config.json` carries the tunnel private key (spec §6).
    pub fn write_config(&self, config: &DaemonConfig) -> anyhow::Result<()> {
        self.write_json_atomic(&self.config_path(), config, 0o600)
    }

    /// Mode 0644: `state.json` carries no secret material.
    pub fn write_state(&self, state: &DaemonState) -> anyhow::Result<()> {
        self.write_json_atomic(&self.state_path(), state, 0o644)
    }

    pub fn read_config(&self) -> anyhow::Result<DaemonConfig> {
        let bytes = fs::read(self.config_path())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn read_state(&self) -> anyhow::Result<DaemonState> {
        let bytes = fs::read(self.state_path())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write_pid(&self, pid: u32) -> anyhow::Result<()> {
        self.ensure_dir()?;
        fs::write(self.pid_path(), pid.to_string())?;
        Ok(())
    }

    pub fn remove_pid(&self) {
        let _ = fs::remove_file(self.pid_path());
    }

    pub fn remove_socket(&self) {
        let _ = fs::remove_file(self.socket_path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DaemonState;

    #[test]
    fn state_round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let persist = PersistDir::new(dir.path());

        let state = DaemonState {
            running: true,
            pid: Some(1234),
            interface: "wg0".into(),
            address: "10.225.0.12/32".into(),
            environment_id: "env-1".into(),
            started_at: Some(chrono::Utc::now()),
        };
        persist.write_state(&state).unwrap();

        let loaded = persist.read_state().unwrap();
        assert!(loaded.running);
        assert_eq!(loaded.interface, "wg0");
        assert_eq!(loaded.environment_id, "env-1");
    }

    #[test]
    fn config_file_is_written_with_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let persist = PersistDir::new(dir.path());
        let config = DaemonConfig {
            interface: "wg0".into(),
            private_key: "private".into(),
            address: "10.225.0.12/32".into(),
            listen_port: 51820,
            server_pub_key: "server-pub".into(),
            server_endpoint: "203.0.113.1:51820".into(),
            allowed_ips: vec!["10.225.0.12/32".into()],
            environment_id: "env-1".into(),
        };
        persist.write_config(&config).unwrap();

        let mode = fs::metadata(persist.config_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
