//! Usage records — out of core scope per spec §1/§3 except as the two
//! lifecycle hooks the environment create/destroy handlers call.

use super::models::UsageRecordRow;
use super::Store;
use uuid::Uuid;

impl Store {
    pub async fn start_usage(&self, team_id: Uuid, environment_id: Uuid) -> sqlx::Result<UsageRecordRow> {
        sqlx::query_as::<_, UsageRecordRow>(
            "INSERT INTO usage_records (id, team_id, environment_id, start_time)
             VALUES ($1, $2, $3, now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(environment_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn end_usage(&self, environment_id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE usage_records
             SET end_time = now(),
                 duration_sec = EXTRACT(EPOCH FROM (now() - start_time))::bigint
             WHERE environment_id = $1 AND end_time IS NULL",
        )
        .bind(environment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
