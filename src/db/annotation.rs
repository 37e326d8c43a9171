//! Annotation inserts and per-user reads.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::model::*;
use crate::store::claim_not_held;

impl Db {
    /// Insert the annotation and, in unit mode, close the writer's live
    /// claim in the same transaction. A rejected write rolls back when `tx`
    /// drops.
    pub async fn record_annotation(
        &self,
        new: &NewAnnotation,
        complete_claim_at: Option<DateTime<Utc>>,
    ) -> Result<Annotation> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        if let Some(now) = complete_claim_at {
            let completed = sqlx::query(
                "UPDATE units SET state = 'annotated', lease_expires_at = NULL
                 WHERE id = $1 AND state = 'claimed' AND assignee = $2 AND lease_expires_at > $3",
            )
            .bind(new.unit_id.0)
            .bind(&new.user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if completed == 0 {
                let repeat: Option<(i32,)> = sqlx::query_as(
                    "SELECT 1 FROM units WHERE id = $1 AND state = 'annotated' AND assignee = $2",
                )
                .bind(new.unit_id.0)
                .bind(&new.user_id)
                .fetch_optional(&mut *tx)
                .await?;
                if repeat.is_none() {
                    return Err(claim_not_held(new.unit_id, &new.user_id));
                }
            }
        }

        let (created_at,): (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO annotations (id, unit_id, batch_id, user_id, label, categories, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING created_at",
        )
        .bind(id)
        .bind(new.unit_id.0)
        .bind(new.batch_id.0)
        .bind(&new.user_id)
        .bind(&new.label)
        .bind(&new.categories)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Annotation {
            id: AnnotationId(id),
            unit_id: new.unit_id,
            batch_id: new.batch_id,
            user_id: new.user_id.clone(),
            label: new.label.clone(),
            categories: new.categories.clone(),
            notes: new.notes.clone(),
            created_at,
        })
    }

    pub async fn annotations_by_user(&self, user_id: &str) -> Result<Vec<Annotation>> {
        let rows: Vec<AnnotationRow> = sqlx::query_as(
            "SELECT id, unit_id, batch_id, user_id, label, categories, notes, created_at
             FROM annotations WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Annotation::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: Uuid,
    unit_id: Uuid,
    batch_id: Uuid,
    user_id: String,
    label: String,
    categories: Vec<String>,
    notes: String,
    created_at: DateTime<Utc>,
}

impl From<AnnotationRow> for Annotation {
    fn from(row: AnnotationRow) -> Self {
        Self {
            id: AnnotationId(row.id),
            unit_id: UnitId(row.unit_id),
            batch_id: BatchId(row.batch_id),
            user_id: row.user_id,
            label: row.label,
            categories: row.categories,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}
