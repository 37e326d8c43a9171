//! Postgres store: connection pool, migrations, health check.
//!
//! Cross-user exclusivity lives in the SQL itself: claims take the row lock
//! with `FOR UPDATE SKIP LOCKED`, and section ownership rides on unique
//! indexes with `ON CONFLICT DO NOTHING`.

pub mod annotation;
pub mod batch;
pub mod claim;
pub mod pointer;
pub mod section;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{Error, Result};
use crate::model::*;
use crate::store::Store;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Postgres integers are signed; indices and counts never are.
fn to_db_int(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::InvalidInput(format!("{what} {value} out of range")))
}

fn from_db_int(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::Other(format!("negative value {value} read from database")))
}

impl Store for Db {
    async fn list_batches(&self) -> Result<Vec<Batch>> {
        Db::list_batches(self).await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        Db::get_batch(self, id).await
    }

    async fn create_batch(&self, name: &str, description: &str) -> Result<Batch> {
        Db::create_batch(self, name, description).await
    }

    async fn append_units(&self, batch_id: BatchId, texts: &[String]) -> Result<Vec<Unit>> {
        Db::append_units(self, batch_id, texts).await
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>> {
        Db::get_unit(self, id).await
    }

    async fn units_in_range(
        &self,
        batch_id: BatchId,
        start: usize,
        end: usize,
    ) -> Result<Vec<Unit>> {
        Db::units_in_range(self, batch_id, start, end).await
    }

    async fn count_annotated_units(&self, batch_id: BatchId) -> Result<usize> {
        Db::count_annotated_units(self, batch_id).await
    }

    async fn claim_next_unit(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<ClaimGrant>> {
        Db::claim_next_unit(self, batch_id, user_id, now, lease).await
    }

    async fn held_claim(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Unit>> {
        Db::held_claim(self, batch_id, user_id, now).await
    }

    async fn release_unit(&self, unit_id: UnitId, user_id: &str) -> Result<bool> {
        Db::release_unit(self, unit_id, user_id).await
    }

    async fn active_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> Result<Option<Assignment>> {
        Db::active_assignment(self, batch_id, user_id).await
    }

    async fn owned_sections(&self, batch_id: BatchId) -> Result<Vec<usize>> {
        Db::owned_sections(self, batch_id).await
    }

    async fn insert_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
        section_number: usize,
        now: DateTime<Utc>,
    ) -> Result<InsertAssignment> {
        Db::insert_assignment(self, batch_id, user_id, section_number, now).await
    }

    async fn set_progress(
        &self,
        batch_id: BatchId,
        user_id: &str,
        progress_index: usize,
    ) -> Result<bool> {
        Db::set_progress(self, batch_id, user_id, progress_index).await
    }

    async fn advance_progress_from(
        &self,
        batch_id: BatchId,
        user_id: &str,
        from: usize,
        to: usize,
    ) -> Result<bool> {
        Db::advance_progress_from(self, batch_id, user_id, from, to).await
    }

    async fn finish_assignment(&self, batch_id: BatchId, user_id: &str) -> Result<bool> {
        Db::finish_assignment(self, batch_id, user_id).await
    }

    async fn sum_section_progress(&self, batch_id: BatchId) -> Result<usize> {
        Db::sum_section_progress(self, batch_id).await
    }

    async fn record_annotation(
        &self,
        new: &NewAnnotation,
        complete_claim_at: Option<DateTime<Utc>>,
    ) -> Result<Annotation> {
        Db::record_annotation(self, new, complete_claim_at).await
    }

    async fn annotations_by_user(&self, user_id: &str) -> Result<Vec<Annotation>> {
        Db::annotations_by_user(self, user_id).await
    }

    async fn get_pointer(&self, user_id: &str) -> Result<Option<UserBatchPointer>> {
        Db::get_pointer(self, user_id).await
    }

    async fn set_pointer(&self, user_id: &str, batch_id: BatchId) -> Result<()> {
        Db::set_pointer(self, user_id, batch_id).await
    }

    async fn clear_pointer(&self, user_id: &str) -> Result<()> {
        Db::clear_pointer(self, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_ints_reject_values_outside_usize() {
        assert_eq!(from_db_int(42).unwrap(), 42);
        assert!(matches!(from_db_int(-1), Err(Error::Other(_))));
        assert!(matches!(
            to_db_int(usize::MAX, "unit offset"),
            Err(Error::InvalidInput(_))
        ));
    }
}
