//! Progress tracker: per-batch completion and per-user statistics.

use std::sync::Arc;

use crate::error::Result;
use crate::model::*;
use crate::store::Store;

pub struct ProgressTracker<S> {
    store: Arc<S>,
    mode: AssignmentMode,
}

impl<S: Store> ProgressTracker<S> {
    pub fn new(store: Arc<S>, mode: AssignmentMode) -> Self {
        Self { store, mode }
    }

    /// `(total, annotated)` for a batch.
    ///
    /// Unit mode counts distinct annotated units, so duplicate annotations
    /// never inflate it. Section mode sums every section's progress index,
    /// which includes skipped units.
    pub async fn batch_progress(&self, batch: &Batch) -> Result<BatchProgress> {
        let annotated = match self.mode {
            AssignmentMode::Unit => self.store.count_annotated_units(batch.id).await?,
            AssignmentMode::Section => self.store.sum_section_progress(batch.id).await?,
        };
        Ok(BatchProgress {
            total: batch.total_unit_count,
            annotated: annotated.min(batch.total_unit_count),
        })
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        validate_user_id(user_id)?;
        let annotations = self.store.annotations_by_user(user_id).await?;
        Ok(UserStats::tally(&annotations))
    }
}
