//! Storage contract for the engine.
//!
//! Sessions are separate clients with no shared memory, so every step that
//! must be exclusive across users is a single call here, implemented as an
//! atomic conditional write by the backend. Callers never read-then-write to
//! win a race.
//!
//! Two backends: [`Db`](crate::db::Db) (Postgres) and [`memory::MemoryStore`].

pub mod memory;

use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;

use crate::error::{Error, Result};
use crate::model::*;

pub trait Store: Send + Sync {
    // -- batches and units ---------------------------------------------------

    fn list_batches(&self) -> impl Future<Output = Result<Vec<Batch>>> + Send;

    fn get_batch(&self, id: BatchId) -> impl Future<Output = Result<Option<Batch>>> + Send;

    fn create_batch(
        &self,
        name: &str,
        description: &str,
    ) -> impl Future<Output = Result<Batch>> + Send;

    /// Append units after the batch's current last index, growing
    /// `total_unit_count`.
    fn append_units(
        &self,
        batch_id: BatchId,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Unit>>> + Send;

    fn get_unit(&self, id: UnitId) -> impl Future<Output = Result<Option<Unit>>> + Send;

    /// Units with `start <= original_index <= end`, in index order.
    fn units_in_range(
        &self,
        batch_id: BatchId,
        start: usize,
        end: usize,
    ) -> impl Future<Output = Result<Vec<Unit>>> + Send;

    fn count_annotated_units(&self, batch_id: BatchId)
    -> impl Future<Output = Result<usize>> + Send;

    // -- claims (unit mode) --------------------------------------------------

    /// Atomically claim the lowest-index unit that is unassigned or whose
    /// lease expired at or before `now`.
    fn claim_next_unit(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> impl Future<Output = Result<Option<ClaimGrant>>> + Send;

    /// Lowest-index unit in the batch on which `user_id` holds a live claim.
    fn held_claim(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Unit>>> + Send;

    /// Revert a claim to unassigned, only if `user_id` still holds it.
    /// Returns whether anything changed.
    fn release_unit(
        &self,
        unit_id: UnitId,
        user_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    // -- section assignments (section mode) ----------------------------------

    fn active_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<Assignment>>> + Send;

    /// Section numbers with an owner, finished or not.
    fn owned_sections(&self, batch_id: BatchId)
    -> impl Future<Output = Result<Vec<usize>>> + Send;

    /// Insert with uniqueness on (batch, section) and on the user's
    /// unfinished row.
    fn insert_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
        section_number: usize,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<InsertAssignment>> + Send;

    /// Set the user's progress unconditionally. Returns false when the user
    /// has no active assignment.
    fn set_progress(
        &self,
        batch_id: BatchId,
        user_id: &str,
        progress_index: usize,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Move progress from `from` to `to` only if it still reads `from`.
    fn advance_progress_from(
        &self,
        batch_id: BatchId,
        user_id: &str,
        from: usize,
        to: usize,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Mark the user's active assignment finished. The section stays owned.
    fn finish_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Sum of `progress_index` over every assignment in the batch.
    fn sum_section_progress(&self, batch_id: BatchId)
    -> impl Future<Output = Result<usize>> + Send;

    // -- annotations ---------------------------------------------------------

    /// Append an annotation as one transaction.
    ///
    /// With `complete_claim_at` set, the writer's claim on the unit must be
    /// live at that instant and the unit moves to annotated. A repeat submit
    /// by the user who already annotated the unit appends without touching
    /// it. Anyone else is rejected and nothing is written.
    fn record_annotation(
        &self,
        new: &NewAnnotation,
        complete_claim_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Annotation>> + Send;

    fn annotations_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Annotation>>> + Send;

    // -- user batch pointers -------------------------------------------------

    fn get_pointer(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserBatchPointer>>> + Send;

    fn set_pointer(
        &self,
        user_id: &str,
        batch_id: BatchId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn clear_pointer(&self, user_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Rejection for a unit-mode record by someone who does not hold the claim.
pub(crate) fn claim_not_held(unit_id: UnitId, user_id: &str) -> Error {
    Error::InvalidInput(format!("unit {unit_id} is not claimed by {user_id}"))
}
