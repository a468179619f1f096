//! Team CRUD. Deletions cascade to API keys and environments via foreign
//! key `ON DELETE CASCADE` (spec §3's lifecycle summary).

use super::models::TeamRow;
use super::Store;
use uuid::Uuid;

impl Store {
    pub async fn create_team(&self, name: &str) -> sqlx::Result<TeamRow> {
        sqlx::query_as::<_, TeamRow>(
            "INSERT INTO teams (id, name, created_at) VALUES ($1, $2, now()) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_team(&self, id: Uuid) -> sqlx::Result<Option<TeamRow>> {
        sqlx::query_as::<_, TeamRow>("SELECT * FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn delete_team(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
