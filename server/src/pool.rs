//! # Machine Pool (§4.2)
//!
//! Keeps at least `min_ready` machines in `ready` state without exceeding
//! `max_total`. State transitions are serialized through a single mutex
//! (spec §5: "no two `Assign`s can hand out the same machine") even though
//! the database-level `claim_ready_machine` query is itself atomic — the
//! mutex additionally serializes the provision-on-empty path so two
//! concurrent callers that both miss never both provision.

use crate::config::Settings;
use crate::provisioner::{Provisioner, ProvisionError};
use crate::store::machines::{MachineStatus, NewMachine};
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool at capacity ({0} machines) and no ready machine available")]
    Exhausted(usize),
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Pool {
    store: Store,
    provisioner: Arc<Provisioner>,
    min_ready: usize,
    max_total: usize,
    lock: Arc<Mutex<()>>,
}

impl Pool {
    pub fn new(store: Store, provisioner: Provisioner, settings: &Settings) -> Self {
        Self {
            store,
            provisioner: Arc::new(provisioner),
            min_ready: settings.min_ready,
            max_total: settings.max_total,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Finds a ready, unassigned machine and claims it for `env_id`; if
    /// none exists, provisions a fresh one (subject to `max_total`) and
    /// assigns that instead.
    ///
    /// The pool-wide lock is held only for the quick bookkeeping steps
    /// (claim-or-reserve, status flips); the SSH-based bootstrap in
    /// `Provisioner::provision` runs unlocked so a machine that takes over
    /// a minute to bring up doesn't freeze every other `assign`/`release`/
    /// `reconcile` call for that long (spec §4.1: `Pool.Assign` must return
    /// promptly; §8 scenario 5 requires concurrent assigns to both proceed).
    pub async fn assign(&self, env_id: Uuid) -> Result<Uuid, PoolError> {
        let reserved = {
            let _guard = self.lock.lock().await;

            if let Some(machine) = self.store.claim_ready_machine(env_id).await? {
                return Ok(machine.id);
            }

            let total = self.store.count_machines().await? as usize;
            if total >= self.max_total {
                return Err(PoolError::Exhausted(self.max_total));
            }

            self.reserve_machine().await?
        };

        self.bring_up(&reserved).await?;

        let _guard = self.lock.lock().await;
        let claimed = self
            .store
            .claim_ready_machine(env_id)
            .await?
            .filter(|m| m.id == reserved.id);

        match claimed {
            Some(m) => Ok(m.id),
            None => Err(PoolError::Exhausted(self.max_total)),
        }
    }

    /// Releases a machine back to the pool, or destroys it outright if the
    /// pool is already over `max_total` (spec §4.2).
    pub async fn release(&self, machine_id: Uuid) -> Result<(), PoolError> {
        let _guard = self.lock.lock().await;

        let total = self.store.count_machines().await? as usize;
        if total > self.max_total {
            self.store
                .set_machine_status(machine_id, MachineStatus::Destroying)
                .await?;
            self.provisioner.destroy(machine_id).await?;
            self.store.delete_machine(machine_id).await?;
        } else {
            self.store.release_machine(machine_id).await?;
        }
        Ok(())
    }

    /// Drives `ready_count` toward `min_ready`, stopping at `max_total`.
    /// Breaks (and logs) on the first provisioning failure rather than
    /// looping forever against a broken provider.
    ///
    /// Each iteration's reserve step takes the pool lock only long enough to
    /// claim capacity; the SSH bootstrap for that machine then runs
    /// unlocked, the same split `assign()` uses, so one slow or wedged
    /// machine can't stall the ticker (or `assign`/`release`) for the rest
    /// of the interval.
    pub async fn reconcile(&self) -> Result<usize, PoolError> {
        let mut ready_count = self
            .store
            .list_machines_by_status(MachineStatus::Ready)
            .await?
            .len();
        let mut provisioned = 0;

        loop {
            if ready_count >= self.min_ready {
                break;
            }

            let reserved = {
                let _guard = self.lock.lock().await;
                let total = self.store.count_machines().await? as usize;
                if total >= self.max_total {
                    break;
                }
                self.reserve_machine().await
            };

            let reserved = match reserved {
                Ok(row) => row,
                Err(err) => {
                    tracing::error!(error = %err, "reconcile: failed to reserve capacity, stopping this pass");
                    break;
                }
            };

            match self.bring_up(&reserved).await {
                Ok(()) => {
                    ready_count += 1;
                    provisioned += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, "reconcile: provisioning failed, stopping this pass");
                    break;
                }
            }
        }

        Ok(provisioned)
    }

    /// Probes every machine's reachability; a `ready` machine that fails
    /// becomes `failed` and is never assigned again.
    pub async fn health_check_all(&self) -> Result<usize, PoolError> {
        let mut failed = 0;
        for machine in self.store.list_machines().await? {
            if machine.status != "ready" {
                continue;
            }
            if self.provisioner.probe_health(&machine).await.is_err() {
                self.store
                    .set_machine_status(machine.id, MachineStatus::Failed)
                    .await?;
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Requests capacity from the `CloudProvider` and inserts its row as
    /// `provisioning`. Callers must hold `self.lock` for this step — it's
    /// the fast half of bringing up a machine.
    async fn reserve_machine(&self) -> Result<crate::store::models::MachineRow, ProvisionError> {
        let new = self.provisioner.request_capacity().await?;
        let row = self
            .store
            .register_machine(NewMachine {
                provider_id: new.provider_id,
                provider_type: new.provider_type,
                public_ip: new.public_ip,
                ssh_host: new.ssh_host,
                ssh_user: new.ssh_user,
                region: new.region,
                size: new.size,
            })
            .await
            .map_err(ProvisionError::Database)?;
        Ok(row)
    }

    /// Runs the slow SSH bootstrap for an already-reserved machine and
    /// flips it to `ready` on success. Deliberately takes no lock while the
    /// bootstrap itself runs — only the final status flip needs one, and
    /// that one is quick.
    async fn bring_up(&self, row: &crate::store::models::MachineRow) -> Result<(), ProvisionError> {
        self.provisioner.provision(&self.store, row).await?;
        self.store
            .set_machine_status(row.id, MachineStatus::Ready)
            .await
            .map_err(ProvisionError::Database)
    }

    /// Spawns the periodic `Reconcile()` background task. Returns a
    /// `CancellationToken` the caller holds to stop the ticker cleanly on
    /// shutdown (spec §4.2: "exits cleanly when the context is cancelled").
    pub fn spawn_reconciler(self: Arc<Self>, interval_s: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_s));
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.reconcile().await {
                            tracing::error!(error = %err, "pool reconcile failed");
                        }
                    }
                }
            }
        });
        token
    }
}
