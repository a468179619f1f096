//! Machine registry rows and the state-machine transitions named in §4.2.
//! The pool (`crate::pool`) is what enforces the legality of a transition;
//! this module is the raw column updates underneath it.

use super::models::MachineRow;
use super::Store;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    Provisioning,
    Ready,
    Assigned,
    Destroying,
    Failed,
}

impl MachineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineStatus::Provisioning => "provisioning",
            MachineStatus::Ready => "ready",
            MachineStatus::Assigned => "assigned",
            MachineStatus::Destroying => "destroying",
            MachineStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(Self::Provisioning),
            "ready" => Some(Self::Ready),
            "assigned" => Some(Self::Assigned),
            "destroying" => Some(Self::Destroying),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

pub struct NewMachine {
    pub provider_id: String,
    pub provider_type: String,
    pub public_ip: IpAddr,
    pub ssh_host: String,
    pub ssh_user: String,
    pub region: String,
    pub size: String,
}

impl Store {
    pub async fn register_machine(&self, m: NewMachine) -> sqlx::Result<MachineRow> {
        sqlx::query_as::<_, MachineRow>(
            "INSERT INTO machines
                (id, provider_id, provider_type, public_ip, status,
                 ssh_host, ssh_user, region, size, created_at)
             VALUES ($1, $2, $3, $4, 'provisioning', $5, $6, $7, $8, now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&m.provider_id)
        .bind(&m.provider_type)
        .bind(IpNetwork::from(m.public_ip))
        .bind(&m.ssh_host)
        .bind(&m.ssh_user)
        .bind(&m.region)
        .bind(&m.size)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_machine(&self, id: Uuid) -> sqlx::Result<Option<MachineRow>> {
        sqlx::query_as::<_, MachineRow>("SELECT * FROM machines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_machines(&self) -> sqlx::Result<Vec<MachineRow>> {
        sqlx::query_as::<_, MachineRow>("SELECT * FROM machines ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_machines_by_status(&self, status: MachineStatus) -> sqlx::Result<Vec<MachineRow>> {
        sqlx::query_as::<_, MachineRow>("SELECT * FROM machines WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
    }

    pub async fn set_machine_status(&self, id: Uuid, status: MachineStatus) -> sqlx::Result<()> {
        sqlx::query("UPDATE machines SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically claims an unassigned ready machine for `env_id`. Returns
    /// `None` if no machine currently qualifies — the caller (the pool)
    /// must then provision one. The `UPDATE ... WHERE status = 'ready' AND
    /// assigned_env IS NULL RETURNING *` shape is what makes two concurrent
    /// callers unable to claim the same row (spec §5's "no two `Assign`s
    /// can hand out the same machine").
    pub async fn claim_ready_machine(&self, env_id: Uuid) -> sqlx::Result<Option<MachineRow>> {
        sqlx::query_as::<_, MachineRow>(
            "UPDATE machines SET status = 'assigned', assigned_env = $1
             WHERE id = (
                 SELECT id FROM machines
                 WHERE status = 'ready' AND assigned_env IS NULL
                 ORDER BY created_at
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(env_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Clears the assignment and returns the machine to `ready`.
    pub async fn release_machine(&self, id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE machines SET status = 'ready', assigned_env = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the WireGuard identity and endpoint generated at agent
    /// bootstrap. Per spec §3, `wg_public_key` is set exactly once; this
    /// only succeeds the first time.
    pub async fn set_wireguard_identity(
        &self,
        id: Uuid,
        public_key: &str,
        endpoint: &str,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE machines SET wg_public_key = $1, wg_endpoint = $2
             WHERE id = $3 AND wg_public_key IS NULL",
        )
        .bind(public_key)
        .bind(endpoint)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_machine(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_machines(&self) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM machines")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
