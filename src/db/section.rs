//! Section assignments.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, from_db_int, to_db_int};
use crate::error::{Error, Result};
use crate::model::*;

impl Db {
    pub async fn active_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> Result<Option<Assignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(
            "SELECT batch_id, section_number, user_id, progress_index, finished, assigned_at, updated_at
             FROM section_assignments
             WHERE batch_id = $1 AND user_id = $2 AND NOT finished",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Assignment::try_from).transpose()
    }

    pub async fn owned_sections(&self, batch_id: BatchId) -> Result<Vec<usize>> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT section_number FROM section_assignments
             WHERE batch_id = $1 ORDER BY section_number",
        )
        .bind(batch_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(n,)| from_db_int(n.into())).collect()
    }

    /// `ON CONFLICT DO NOTHING` covers both the (batch, section) primary key
    /// and the one-unfinished-row-per-user index. An empty result is then
    /// disambiguated by looking for the user's own row.
    pub async fn insert_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
        section_number: usize,
        now: DateTime<Utc>,
    ) -> Result<InsertAssignment> {
        let inserted: Option<AssignmentRow> = sqlx::query_as(
            "INSERT INTO section_assignments
                 (batch_id, section_number, user_id, progress_index, finished, assigned_at, updated_at)
             VALUES ($1, $2, $3, 0, false, $4, $4)
             ON CONFLICT DO NOTHING
             RETURNING batch_id, section_number, user_id, progress_index, finished, assigned_at, updated_at",
        )
        .bind(batch_id.0)
        .bind(to_db_int(section_number, "section number")?)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertAssignment::Inserted(row.try_into()?));
        }

        Ok(match self.active_assignment(batch_id, user_id).await? {
            Some(existing) => InsertAssignment::AlreadyAssigned(existing),
            None => InsertAssignment::SectionTaken,
        })
    }

    pub async fn set_progress(
        &self,
        batch_id: BatchId,
        user_id: &str,
        progress_index: usize,
    ) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE section_assignments SET progress_index = $3, updated_at = now()
             WHERE batch_id = $1 AND user_id = $2 AND NOT finished",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .bind(to_db_int(progress_index, "progress index")?)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    pub async fn advance_progress_from(
        &self,
        batch_id: BatchId,
        user_id: &str,
        from: usize,
        to: usize,
    ) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE section_assignments SET progress_index = $4, updated_at = now()
             WHERE batch_id = $1 AND user_id = $2 AND NOT finished AND progress_index = $3",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .bind(to_db_int(from, "progress index")?)
        .bind(to_db_int(to, "progress index")?)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    pub async fn finish_assignment(&self, batch_id: BatchId, user_id: &str) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE section_assignments SET finished = true, updated_at = now()
             WHERE batch_id = $1 AND user_id = $2 AND NOT finished",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    pub async fn sum_section_progress(&self, batch_id: BatchId) -> Result<usize> {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(progress_index), 0)::BIGINT
             FROM section_assignments WHERE batch_id = $1",
        )
        .bind(batch_id.0)
        .fetch_one(&self.pool)
        .await?;
        from_db_int(sum)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AssignmentRow {
    batch_id: Uuid,
    section_number: i32,
    user_id: String,
    progress_index: i32,
    finished: bool,
    assigned_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = Error;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(Self {
            batch_id: BatchId(row.batch_id),
            user_id: row.user_id,
            section_number: from_db_int(row.section_number.into())?,
            progress_index: from_db_int(row.progress_index.into())?,
            finished: row.finished,
            assigned_at: row.assigned_at,
            updated_at: row.updated_at,
        })
    }
}
