//! # Persistent Store
//!
//! PostgreSQL-backed registry of teams, API keys, machines, environments and
//! peers (spec §3, §6). Every entity is owned by the store; in-memory
//! snapshots taken by the pool or the reconcilers must never outlive the
//! request or tick that produced them (spec §3's ownership note).

pub mod api_keys;
pub mod environments;
pub mod machines;
pub mod models;
pub mod peers;
pub mod teams;
pub mod usage;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    /// Connects with the bounded pool spec §5 calls for (min 5, max 25).
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(5)
            .max_connections(25)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
