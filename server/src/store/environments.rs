//! Environment rows, including the container-subnet allocator.
//!
//! Spec §9 leaves the subnet numbering policy an open question and only
//! requires that collisions be *detected*. This resolves it (SPEC_FULL.md
//! open question 1) as sequential `/24`s inside `10.224.0.0/16`, with the
//! database's unique index on `subnet` as the collision backstop: a racing
//! insert that picked the same next-free `/24` fails with a unique
//! violation and is retried against a freshly recomputed next address.

use super::models::EnvironmentRow;
use super::Store;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::Ipv4Addr;
use uuid::Uuid;

const ENVIRONMENT_SUPERNET_BASE: [u8; 2] = [10, 224];
const MAX_SUBNET_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentStatus {
    Pending,
    Provisioning,
    Ready,
    Error,
    Destroyed,
}

impl EnvironmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentStatus::Pending => "pending",
            EnvironmentStatus::Provisioning => "provisioning",
            EnvironmentStatus::Ready => "ready",
            EnvironmentStatus::Error => "error",
            EnvironmentStatus::Destroyed => "destroyed",
        }
    }
}

pub struct NewEnvironment {
    pub team_id: Uuid,
    pub name: String,
    pub project: String,
    pub format: String,
    pub services: Vec<String>,
    pub created_by: String,
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateEnvironmentError {
    #[error("environment name already used in this team")]
    NameConflict,
    #[error("container subnet exhausted")]
    SubnetExhausted,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Store {
    /// Next free `/24` index: one past the highest third-octet value
    /// currently assigned to an active (non-destroyed) environment.
    async fn next_subnet_index(&self) -> sqlx::Result<u8> {
        let (max_third_octet,): (Option<i32>,) = sqlx::query_as(
            "SELECT MAX(host(network(subnet))::inet - inet '10.224.0.0')::int / 256
             FROM environments WHERE status != 'destroyed'",
        )
        .fetch_one(&self.pool)
        .await
        .unwrap_or((None,));
        Ok(max_third_octet.map(|n| n as u8 + 1).unwrap_or(0))
    }

    pub async fn create_environment(
        &self,
        new: NewEnvironment,
    ) -> Result<EnvironmentRow, CreateEnvironmentError> {
        let mut attempt = 0;
        loop {
            let third_octet = self.next_subnet_index().await?.wrapping_add(attempt as u8);
            if attempt >= MAX_SUBNET_RETRIES {
                return Err(CreateEnvironmentError::SubnetExhausted);
            }
            let subnet = Ipv4Addr::new(
                ENVIRONMENT_SUPERNET_BASE[0],
                ENVIRONMENT_SUPERNET_BASE[1],
                third_octet,
                0,
            );
            let subnet_net = IpNetwork::new(subnet.into(), 24)
                .expect("a /24 mask is always valid for an ipv4 address");

            let result = sqlx::query_as::<_, EnvironmentRow>(
                "INSERT INTO environments
                    (id, team_id, name, project, format, status, subnet,
                     services, created_at, created_by, source)
                 VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, now(), $8, $9)
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(new.team_id)
            .bind(&new.name)
            .bind(&new.project)
            .bind(&new.format)
            .bind(subnet_net)
            .bind(&new.services)
            .bind(&new.created_by)
            .bind(&new.source)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => return Ok(row),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    let constraint = db_err.constraint().unwrap_or_default();
                    if constraint.contains("name") {
                        return Err(CreateEnvironmentError::NameConflict);
                    }
                    // subnet collision: retry with the next candidate
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get_environment(&self, id: Uuid) -> sqlx::Result<Option<EnvironmentRow>> {
        sqlx::query_as::<_, EnvironmentRow>("SELECT * FROM environments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_environments(&self, team_id: Uuid) -> sqlx::Result<Vec<EnvironmentRow>> {
        sqlx::query_as::<_, EnvironmentRow>(
            "SELECT * FROM environments WHERE team_id = $1 ORDER BY created_at",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn set_environment_status(
        &self,
        id: Uuid,
        status: EnvironmentStatus,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE environments SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_environment_machine(&self, id: Uuid, machine_id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE environments SET machine_id = $1, status = 'provisioning' WHERE id = $2",
        )
        .bind(machine_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_environment(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM environments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
