//! # Container Stack Runner (§1, §4.5)
//!
//! The agent treats the container engine as an opaque sub-process target
//! (spec §1 scopes invocation/log-reading out of the core). `StackRunner` is
//! the seam; [`ComposeStackRunner`] is the one implementation this crate
//! ships, shelling out to `docker compose` per environment the way
//! `Vanopticon-Heimdall`'s `devops::docker_manager` drives its dev-db
//! container — a timeout-wrapped `tokio::process::Command`, nothing fancier.
//!
//! Each environment gets its own compose project name (`env_name`) and
//! working directory (`workspace_path`), so two environments on the same
//! machine never collide on container names.

use async_trait::async_trait;
use cilo_protocol::agent::{ServiceState, ServiceStatus};
use dashmap::DashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::Stream;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("failed to spawn subprocess: {0}")]
    Spawn(String),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("command exited with non-zero status: {0}")]
    NonZeroExit(String),
}

#[async_trait]
pub trait StackRunner: Send + Sync {
    async fn up(&self, workspace_path: &str, env_name: &str, subnet: &str) -> Result<(), StackError>;
    async fn down(&self, env_name: &str) -> Result<(), StackError>;
    async fn status(&self, env_name: &str) -> Result<Vec<ServiceStatus>, StackError>;

    /// Starts `docker compose logs` for `service` in `env_name` and hands
    /// back a line stream. Dropping the stream (e.g. on HTTP request
    /// cancellation) kills the subprocess — see [`LogProcess`]'s `Drop`.
    fn logs(
        &self,
        env_name: &str,
        service: &str,
        follow: bool,
    ) -> Result<LogProcess, StackError>;
}

/// Owns a running `docker compose logs` child process and exposes its
/// stdout as a line stream. Dropping this before the stream is exhausted
/// kills the subprocess, so an HTTP handler that gets cancelled mid-stream
/// (spec §4.5: "Cancellation of the HTTP request closes the pipe and
/// signals the subprocess") doesn't leak it.
pub struct LogProcess {
    child: Child,
    lines: LinesStream<tokio::io::BufReader<tokio::process::ChildStdout>>,
}

impl LogProcess {
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<String>> {
        self.lines
    }
}

impl Drop for LogProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

pub struct ComposeStackRunner {
    workspace_root: PathBuf,
    /// `env_name -> workspace_path` as supplied to `up`, so `down`/`status`/
    /// `logs` (which only take `env_name`, per §4.5's route shapes) know
    /// which directory to run compose in without the caller repeating it.
    workspaces: DashMap<String, PathBuf>,
}

impl ComposeStackRunner {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            workspaces: DashMap::new(),
        }
    }

    fn project_dir(&self, env_name: &str) -> PathBuf {
        self.workspaces
            .get(env_name)
            .map(|p| p.clone())
            .unwrap_or_else(|| self.workspace_root.join(env_name))
    }

    async fn run_capture(&self, cmd: &mut Command) -> Result<String, StackError> {
        let output = timeout(COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| StackError::Timeout(COMMAND_TIMEOUT))?
            .map_err(|e| StackError::Spawn(e.to_string()))?;
        if !output.status.success() {
            return Err(StackError::NonZeroExit(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl StackRunner for ComposeStackRunner {
    /// `docker compose -p <env_name> up -d` in the environment's workspace
    /// directory. `subnet` is passed through as `COMPOSE_SUBNET` so a
    /// compose file can bind its network to the environment's container
    /// subnet if it wants to; the agent itself never parses compose YAML.
    async fn up(&self, workspace_path: &str, env_name: &str, subnet: &str) -> Result<(), StackError> {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "-p", env_name, "up", "-d"])
            .current_dir(workspace_path)
            .env("COMPOSE_SUBNET", subnet)
            .stdin(Stdio::null());
        let _ = self.run_capture(&mut cmd).await?;
        self.workspaces
            .insert(env_name.to_string(), PathBuf::from(workspace_path));
        Ok(())
    }

    async fn down(&self, env_name: &str) -> Result<(), StackError> {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "-p", env_name, "down"])
            .current_dir(self.project_dir(env_name))
            .stdin(Stdio::null());
        let _ = self.run_capture(&mut cmd).await?;
        Ok(())
    }

    async fn status(&self, env_name: &str) -> Result<Vec<ServiceStatus>, StackError> {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "-p", env_name, "ps", "--format", "json"])
            .current_dir(self.project_dir(env_name))
            .stdin(Stdio::null());
        let out = self.run_capture(&mut cmd).await?;
        Ok(parse_compose_ps(&out))
    }

    fn logs(&self, env_name: &str, service: &str, follow: bool) -> Result<LogProcess, StackError> {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "-p", env_name, "logs"]);
        if follow {
            cmd.arg("-f");
        }
        cmd.arg(service)
            .current_dir(self.project_dir(env_name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| StackError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StackError::Spawn("child has no stdout pipe".into()))?;
        let lines = LinesStream::new(tokio::io::BufReader::new(stdout).lines());
        Ok(LogProcess { child, lines })
    }
}

/// Parses `docker compose ps --format json` output, which is one JSON
/// object per line (not a JSON array). Lines that don't parse are skipped
/// rather than failing the whole call — a partially-up stack still owes
/// the caller whatever status it can report.
fn parse_compose_ps(output: &str) -> Vec<ServiceStatus> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .map(|v| {
            let name = v
                .get("Service")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown")
                .to_string();
            let state = match v.get("State").and_then(|s| s.as_str()).unwrap_or("") {
                "running" => ServiceState::Running,
                "restarting" | "created" => ServiceState::Starting,
                "exited" | "dead" => ServiceState::Errored,
                _ => ServiceState::Stopped,
            };
            ServiceStatus { name, state }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compose_ps_lines_tolerating_garbage() {
        let output = "{\"Service\":\"web\",\"State\":\"running\"}\n\
                       not json\n\
                       {\"Service\":\"db\",\"State\":\"exited\"}\n";
        let statuses = parse_compose_ps(output);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "web");
        assert!(matches!(statuses[0].state, ServiceState::Running));
        assert_eq!(statuses[1].name, "db");
        assert!(matches!(statuses[1].state, ServiceState::Errored));
    }

    #[test]
    fn parses_empty_output_as_no_services() {
        assert!(parse_compose_ps("").is_empty());
    }
}
