//! Peer rows. Insertion happens-before the agent add-peer call and deletion
//! happens-before the agent remove-peer call (spec §5's ordering guarantee)
//! — both are enforced by the caller (`crate::api::wireguard`), not here;
//! this module only ever reflects what the store currently holds.

use super::models::PeerRow;
use super::Store;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::Ipv4Addr;
use uuid::Uuid;

pub struct NewPeer {
    pub machine_id: Uuid,
    pub environment_id: Uuid,
    pub user_id: Option<String>,
    pub public_key: String,
    pub assigned_ip: Ipv4Addr,
}

#[derive(Debug, thiserror::Error)]
pub enum InsertPeerError {
    #[error("public key already registered")]
    PublicKeyConflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Store {
    pub async fn insert_peer(&self, new: NewPeer) -> Result<PeerRow, InsertPeerError> {
        let result = sqlx::query_as::<_, PeerRow>(
            "INSERT INTO wireguard_peers
                (id, machine_id, environment_id, user_id, public_key, assigned_ip, connected_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.machine_id)
        .bind(new.environment_id)
        .bind(&new.user_id)
        .bind(&new.public_key)
        .bind(IpNetwork::from(new.assigned_ip))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(InsertPeerError::PublicKeyConflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_peer_by_public_key(&self, public_key: &str) -> sqlx::Result<Option<PeerRow>> {
        sqlx::query_as::<_, PeerRow>("SELECT * FROM wireguard_peers WHERE public_key = $1")
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn delete_peer_by_public_key(
        &self,
        machine_id: Uuid,
        public_key: &str,
    ) -> sqlx::Result<Option<PeerRow>> {
        sqlx::query_as::<_, PeerRow>(
            "DELETE FROM wireguard_peers WHERE machine_id = $1 AND public_key = $2 RETURNING *",
        )
        .bind(machine_id)
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_peers_for_machine(&self, machine_id: Uuid) -> sqlx::Result<Vec<PeerRow>> {
        sqlx::query_as::<_, PeerRow>(
            "SELECT * FROM wireguard_peers WHERE machine_id = $1 ORDER BY connected_at",
        )
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_peers_for_environment(
        &self,
        environment_id: Uuid,
    ) -> sqlx::Result<Vec<PeerRow>> {
        sqlx::query_as::<_, PeerRow>(
            "SELECT * FROM wireguard_peers WHERE environment_id = $1 ORDER BY connected_at",
        )
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await
    }

    /// All IPs currently held by peers of `machine_id` — the set the
    /// overlay allocator (§4.7) scans against.
    pub async fn assigned_ips_for_machine(&self, machine_id: Uuid) -> sqlx::Result<Vec<Ipv4Addr>> {
        let rows: Vec<(IpNetwork,)> = sqlx::query_as(
            "SELECT assigned_ip FROM wireguard_peers WHERE machine_id = $1",
        )
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(net,)| match net.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .collect())
    }

    pub async fn update_last_seen(&self, public_key: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE wireguard_peers SET last_seen = now() WHERE public_key = $1")
            .bind(public_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_peers_for_environment(&self, environment_id: Uuid) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM wireguard_peers WHERE environment_id = $1")
            .bind(environment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
