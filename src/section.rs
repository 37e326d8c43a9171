//! Section assigner: whole sections owned by one user, with a persisted
//! progress index so a reloaded session resumes where it stopped.
//!
//! Sections are never handed back. An abandoned section stays with its
//! original owner.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::*;
use crate::partition::{self, SectionRange};
use crate::store::Store;
use crate::telemetry::metrics;

pub struct SectionAssigner<S> {
    store: Arc<S>,
}

impl<S: Store> SectionAssigner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resume the user's unfinished section, or take the lowest unowned one.
    /// `None` means every section in the batch already has an owner.
    ///
    /// Repeated calls without an intervening advance return the same grant.
    pub async fn get_or_assign_section(
        &self,
        batch: &Batch,
        user_id: &str,
    ) -> Result<Option<SectionGrant>> {
        validate_user_id(user_id)?;
        let count = partition::section_count(batch.total_unit_count);

        loop {
            if let Some(existing) = self.store.active_assignment(batch.id, user_id).await? {
                debug!(
                    batch_id = %batch.id,
                    user_id,
                    section = existing.section_number,
                    "section resumed"
                );
                metrics::sections().add(1, &[KeyValue::new("result", "resumed")]);
                return Ok(Some(resumed(&existing)));
            }

            let owned: BTreeSet<usize> =
                self.store.owned_sections(batch.id).await?.into_iter().collect();
            let Some(candidate) = (1..=count).find(|n| !owned.contains(n)) else {
                info!(batch_id = %batch.id, user_id, "all sections owned");
                metrics::sections().add(1, &[KeyValue::new("result", "exhausted")]);
                return Ok(None);
            };

            match self
                .store
                .insert_assignment(batch.id, user_id, candidate, Utc::now())
                .await?
            {
                InsertAssignment::Inserted(assignment) => {
                    info!(batch_id = %batch.id, user_id, section = candidate, "section assigned");
                    metrics::sections().add(1, &[KeyValue::new("result", "assigned")]);
                    return Ok(Some(SectionGrant {
                        section_number: assignment.section_number,
                        resume_index: assignment.progress_index,
                        resumed: false,
                    }));
                }
                // Same user raced itself, e.g. a double submit.
                InsertAssignment::AlreadyAssigned(existing) => {
                    metrics::sections().add(1, &[KeyValue::new("result", "resumed")]);
                    return Ok(Some(resumed(&existing)));
                }
                // Someone else took it first: the owned set has grown, so
                // the next pass picks a different candidate or runs out.
                InsertAssignment::SectionTaken => {
                    debug!(
                        batch_id = %batch.id,
                        user_id,
                        section = candidate,
                        "section taken, retrying"
                    );
                    metrics::sections().add(1, &[KeyValue::new("result", "conflict_retry")]);
                }
            }
        }
    }

    pub async fn active(&self, batch_id: BatchId, user_id: &str) -> Result<Option<Assignment>> {
        self.store.active_assignment(batch_id, user_id).await
    }

    /// Persist the user's progress through their section. Last write wins,
    /// so a duplicate submit of the same index leaves it unchanged.
    pub async fn advance(&self, batch_id: BatchId, user_id: &str, new_index: usize) -> Result<()> {
        validate_user_id(user_id)?;
        if !self.store.set_progress(batch_id, user_id, new_index).await? {
            return Err(no_active_section(batch_id, user_id));
        }
        debug!(%batch_id, user_id, progress = new_index, "progress saved");
        metrics::progress_advances().add(1, &[KeyValue::new("kind", "decision")]);
        Ok(())
    }

    /// Move past the current unit without a decision. Only moves if the
    /// index still reads what this call observed, so two racing skips
    /// advance once. Returns the index after the call.
    pub async fn skip(&self, batch: &Batch, user_id: &str) -> Result<usize> {
        validate_user_id(user_id)?;
        let assignment = self
            .store
            .active_assignment(batch.id, user_id)
            .await?
            .ok_or_else(|| no_active_section(batch.id, user_id))?;
        let range = section_range(batch, assignment.section_number)?;

        let from = assignment.progress_index;
        if from >= range.unit_count() {
            return Ok(from);
        }
        if self
            .store
            .advance_progress_from(batch.id, user_id, from, from + 1)
            .await?
        {
            metrics::progress_advances().add(1, &[KeyValue::new("kind", "skip")]);
            return Ok(from + 1);
        }
        debug!(batch_id = %batch.id, user_id, "progress moved concurrently, skip not applied");
        Ok(self
            .store
            .active_assignment(batch.id, user_id)
            .await?
            .map_or(from, |a| a.progress_index))
    }

    /// Retire the user's completed section so a new one can be requested.
    /// The section stays owned.
    pub async fn finish_section(&self, batch: &Batch, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        let assignment = self
            .store
            .active_assignment(batch.id, user_id)
            .await?
            .ok_or_else(|| no_active_section(batch.id, user_id))?;
        let range = section_range(batch, assignment.section_number)?;

        if assignment.progress_index < range.unit_count() {
            return Err(Error::InvalidInput(format!(
                "section {} is not complete ({} of {} done)",
                assignment.section_number,
                assignment.progress_index,
                range.unit_count()
            )));
        }

        self.store.finish_assignment(batch.id, user_id).await?;
        info!(
            batch_id = %batch.id,
            user_id,
            section = assignment.section_number,
            "section finished"
        );
        Ok(())
    }
}

fn resumed(assignment: &Assignment) -> SectionGrant {
    SectionGrant {
        section_number: assignment.section_number,
        resume_index: assignment.progress_index,
        resumed: true,
    }
}

/// Range of an assigned section, which must exist for the batch's size.
pub(crate) fn section_range(batch: &Batch, section_number: usize) -> Result<SectionRange> {
    partition::section_at(batch.total_unit_count, section_number).ok_or_else(|| {
        Error::Other(format!(
            "section {section_number} does not exist in batch {} of {} units",
            batch.id, batch.total_unit_count
        ))
    })
}

fn no_active_section(batch_id: BatchId, user_id: &str) -> Error {
    Error::NotFound(format!("no active section for {user_id} in batch {batch_id}"))
}
