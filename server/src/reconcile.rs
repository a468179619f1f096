//! # Peer ↔ Agent Reconciler (§4.3)
//!
//! Periodically diffs the store's `Peer` rows for each `ready`/`assigned`
//! machine against what that machine's agent reports, and corrects drift in
//! either direction. This is what absorbs the race where a key-exchange
//! persisted a `Peer` row but the synchronous add-peer call to the agent
//! failed (§4.1: "Failure to reach the agent is logged but the exchange
//! still succeeds... a reconciler will later replay missing adds").

use crate::agent_client::AgentClient;
use crate::store::Store;
use cilo_protocol::validate::OVERLAY_SUBNET;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct PeerReconciler {
    store: Store,
    agent_client: AgentClient,
}

impl PeerReconciler {
    pub fn new(store: Store, agent_client: AgentClient) -> Self {
        Self {
            store,
            agent_client,
        }
    }

    /// One reconciliation pass across every non-failed, non-destroying
    /// machine.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        let machines = self.store.list_machines().await?;
        for machine in machines {
            if !matches!(machine.status.as_str(), "ready" | "assigned") {
                continue;
            }

            let host = machine.public_ip.ip().to_string();

            let desired = self.store.list_peers_for_machine(machine.id).await?;
            let desired_keys: HashSet<String> =
                desired.iter().map(|p| p.public_key.clone()).collect();

            let observed = match self.agent_client.list_peers(&host).await {
                Ok(peers) => peers,
                Err(err) => {
                    tracing::warn!(machine_id = %machine.id, error = %err, "reconcile: agent unreachable");
                    continue;
                }
            };
            let observed_keys: HashSet<String> =
                observed.iter().map(|p| p.public_key.clone()).collect();

            // §4.3's "LAST_SEEN refresh folded into the agent's periodic
            // status push" — this reconciler pass *is* that push's
            // consumer, since the agent exposes handshake recency on
            // `/wireguard/status` rather than calling the control plane
            // itself. A peer with a reported handshake is live; stamp it.
            for observed_peer in &observed {
                if observed_peer.last_handshake_s.is_some() {
                    if let Err(err) = self
                        .store
                        .update_last_seen(&observed_peer.public_key)
                        .await
                    {
                        tracing::warn!(
                            machine_id = %machine.id,
                            public_key = %observed_peer.public_key,
                            error = %err,
                            "reconcile: failed to update peer last_seen"
                        );
                    }
                }
            }

            // Missing on the agent: re-add. Rebuild the full three-entry
            // `allowed_ips` list the same way `exchange()` does
            // (`[assigned_ip/32, environment_subnet, 10.225.0.0/16]`) — the
            // agent's add-peer is set-semantic, so re-adding with only the
            // bare `/32` would silently drop the peer's route to the
            // environment subnet and the overlay mesh.
            for peer in &desired {
                if observed_keys.contains(&peer.public_key) {
                    continue;
                }

                let env = match self.store.get_environment(peer.environment_id).await? {
                    Some(env) => env,
                    None => {
                        tracing::warn!(
                            machine_id = %machine.id,
                            environment_id = %peer.environment_id,
                            public_key = %peer.public_key,
                            "reconcile: missing peer's environment is gone, skipping re-add"
                        );
                        continue;
                    }
                };

                let allowed_ips = [
                    format!("{}/32", peer.assigned_ip.ip()),
                    env.subnet.to_string(),
                    OVERLAY_SUBNET.to_string(),
                ]
                .join(",");

                if let Err(err) = self
                    .agent_client
                    .add_peer(&host, &peer.public_key, &allowed_ips)
                    .await
                {
                    tracing::warn!(
                        machine_id = %machine.id,
                        public_key = %peer.public_key,
                        error = %err,
                        "reconcile: failed to re-add missing peer"
                    );
                }
            }

            // Present on the agent but absent from the registry: remove.
            for observed_peer in &observed {
                if !desired_keys.contains(&observed_peer.public_key) {
                    if let Err(err) = self
                        .agent_client
                        .remove_peer(&host, &observed_peer.public_key)
                        .await
                    {
                        tracing::warn!(
                            machine_id = %machine.id,
                            public_key = %observed_peer.public_key,
                            error = %err,
                            "reconcile: failed to remove orphaned peer"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn spawn(self: Arc<Self>, interval_s: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_s));
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_once().await {
                            tracing::error!(error = %err, "peer reconcile pass failed");
                        }
                    }
                }
            }
        });
        token
    }
}
