//! User batch pointers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::model::*;

impl Db {
    pub async fn get_pointer(&self, user_id: &str) -> Result<Option<UserBatchPointer>> {
        let row: Option<(String, Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, batch_id, updated_at FROM user_batch_pointers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, batch_id, updated_at)| UserBatchPointer {
            user_id,
            batch_id: BatchId(batch_id),
            updated_at,
        }))
    }

    pub async fn set_pointer(&self, user_id: &str, batch_id: BatchId) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_batch_pointers (user_id, batch_id, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (user_id) DO UPDATE
             SET batch_id = EXCLUDED.batch_id, updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(batch_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_pointer(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_batch_pointers WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
