//! Unit claims under a lease.
//!
//! The claim is one statement: the candidate row is selected and locked
//! with `FOR UPDATE SKIP LOCKED`, then updated in place. A concurrent
//! claimer either skips the locked row or, if it already committed,
//! re-checks the eligibility predicate against the new version.

use chrono::{DateTime, TimeDelta, Utc};

use super::Db;
use super::batch::UnitRow;
use crate::error::Result;
use crate::model::*;

impl Db {
    pub async fn claim_next_unit(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<ClaimGrant>> {
        let row: Option<ClaimRow> = sqlx::query_as(
            "WITH candidate AS (
                 SELECT id, state AS previous_state, assignee AS previous_assignee
                 FROM units
                 WHERE batch_id = $1
                   AND (state = 'unassigned'
                        OR (state = 'claimed' AND (lease_expires_at IS NULL OR lease_expires_at <= $3)))
                 ORDER BY original_index
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE units u
             SET state = 'claimed', assignee = $2, claimed_at = $3, lease_expires_at = $4
             FROM candidate c
             WHERE u.id = c.id
             RETURNING u.id, u.batch_id, u.text, u.original_index, u.state, u.assignee,
                       u.claimed_at, u.lease_expires_at,
                       CASE WHEN c.previous_state = 'claimed' THEN c.previous_assignee END
                           AS reclaimed_from",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .bind(now)
        .bind(now + lease)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ClaimGrant {
                unit: row.unit.try_into_unit()?,
                reclaimed_from: row.reclaimed_from,
            })
        })
        .transpose()
    }

    pub async fn held_claim(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Unit>> {
        let row: Option<UnitRow> = sqlx::query_as(
            "SELECT id, batch_id, text, original_index, state, assignee, claimed_at, lease_expires_at
             FROM units
             WHERE batch_id = $1 AND state = 'claimed' AND assignee = $2 AND lease_expires_at > $3
             ORDER BY original_index
             LIMIT 1",
        )
        .bind(batch_id.0)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UnitRow::try_into_unit).transpose()
    }

    /// Conditioned on the caller still being the assignee, so a stale
    /// release never reverts someone else's claim.
    pub async fn release_unit(&self, unit_id: UnitId, user_id: &str) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE units
             SET state = 'unassigned', assignee = NULL, claimed_at = NULL, lease_expires_at = NULL
             WHERE id = $1 AND state = 'claimed' AND assignee = $2",
        )
        .bind(unit_id.0)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    #[sqlx(flatten)]
    unit: UnitRow,
    reclaimed_from: Option<String>,
}
