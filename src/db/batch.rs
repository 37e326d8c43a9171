//! Batch and unit queries, plus ingestion.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, from_db_int, to_db_int};
use crate::error::{Error, Result};
use crate::model::*;

impl Db {
    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        let rows: Vec<BatchRow> = sqlx::query_as(
            "SELECT id, name, description, unit_count FROM batches ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Batch::try_from).collect()
    }

    pub async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        let row: Option<BatchRow> =
            sqlx::query_as("SELECT id, name, description, unit_count FROM batches WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Batch::try_from).transpose()
    }

    pub async fn create_batch(&self, name: &str, description: &str) -> Result<Batch> {
        let row: BatchRow = sqlx::query_as(
            "INSERT INTO batches (id, name, description, unit_count)
             VALUES ($1, $2, $3, 0)
             RETURNING id, name, description, unit_count",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    /// Append units at the end of the batch. The batch row is locked for the
    /// duration so concurrent ingests get disjoint index ranges.
    pub async fn append_units(&self, batch_id: BatchId, texts: &[String]) -> Result<Vec<Unit>> {
        let mut tx = self.pool.begin().await?;

        let count: Option<(i32,)> =
            sqlx::query_as("SELECT unit_count FROM batches WHERE id = $1 FOR UPDATE")
                .bind(batch_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let (first_index,) = count.ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))?;

        let mut units = Vec::with_capacity(texts.len());
        for (offset, text) in texts.iter().enumerate() {
            let index = first_index + to_db_int(offset, "unit offset")?;
            let row: UnitRow = sqlx::query_as(
                "INSERT INTO units (id, batch_id, text, original_index, state)
                 VALUES ($1, $2, $3, $4, 'unassigned')
                 RETURNING id, batch_id, text, original_index, state, assignee, claimed_at, lease_expires_at",
            )
            .bind(Uuid::new_v4())
            .bind(batch_id.0)
            .bind(text)
            .bind(index)
            .fetch_one(&mut *tx)
            .await?;
            units.push(row.try_into_unit()?);
        }

        sqlx::query("UPDATE batches SET unit_count = unit_count + $1 WHERE id = $2")
            .bind(to_db_int(texts.len(), "unit count")?)
            .bind(batch_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(units)
    }

    pub async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>> {
        let row: Option<UnitRow> = sqlx::query_as(
            "SELECT id, batch_id, text, original_index, state, assignee, claimed_at, lease_expires_at
             FROM units WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UnitRow::try_into_unit).transpose()
    }

    pub async fn units_in_range(
        &self,
        batch_id: BatchId,
        start: usize,
        end: usize,
    ) -> Result<Vec<Unit>> {
        let rows: Vec<UnitRow> = sqlx::query_as(
            "SELECT id, batch_id, text, original_index, state, assignee, claimed_at, lease_expires_at
             FROM units
             WHERE batch_id = $1 AND original_index BETWEEN $2 AND $3
             ORDER BY original_index",
        )
        .bind(batch_id.0)
        .bind(to_db_int(start, "start index")?)
        .bind(to_db_int(end, "end index")?)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UnitRow::try_into_unit).collect()
    }

    pub async fn count_annotated_units(&self, batch_id: BatchId) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM units WHERE batch_id = $1 AND state = 'annotated'",
        )
        .bind(batch_id.0)
        .fetch_one(&self.pool)
        .await?;
        from_db_int(count)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    name: String,
    description: String,
    unit_count: i32,
}

impl TryFrom<BatchRow> for Batch {
    type Error = Error;

    fn try_from(row: BatchRow) -> Result<Self> {
        Ok(Self {
            id: BatchId(row.id),
            name: row.name,
            description: row.description,
            total_unit_count: from_db_int(row.unit_count.into())?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct UnitRow {
    id: Uuid,
    batch_id: Uuid,
    text: String,
    original_index: i32,
    state: String,
    assignee: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
}

impl UnitRow {
    pub(super) fn try_into_unit(self) -> Result<Unit> {
        Ok(Unit {
            id: UnitId(self.id),
            batch_id: BatchId(self.batch_id),
            text: self.text,
            original_index: from_db_int(self.original_index.into())?,
            state: self.state.parse()?,
            assignee: self.assignee,
            claimed_at: self.claimed_at,
            lease_expires_at: self.lease_expires_at,
        })
    }
}
