//! Assignment coordinator: the façade the presentation shell calls.
//!
//! Answers "what should this user work on next?" and "record this decision
//! and advance", in whichever [`AssignmentMode`] the deployment runs.
//! Which batch a user is in is explicit state, kept as a
//! [`UserBatchPointer`] in the store and resolved per request.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::info;

use crate::config::{self, Config, FormConfig};
use crate::error::{Error, Result};
use crate::lease::LeaseManager;
use crate::model::*;
use crate::progress::ProgressTracker;
use crate::recorder::AnnotationRecorder;
use crate::section::{SectionAssigner, section_range};
use crate::store::Store;
use crate::telemetry::work::traced;

/// Engine settings, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: AssignmentMode,
    pub lease_duration: TimeDelta,
    pub form: FormConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: AssignmentMode::default(),
            lease_duration: TimeDelta::seconds(config::DEFAULT_LEASE_SECS),
            form: FormConfig::default(),
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.mode,
            lease_duration: config.lease_duration,
            form: config.form.clone(),
        }
    }
}

pub struct Coordinator<S> {
    store: Arc<S>,
    mode: AssignmentMode,
    leases: LeaseManager<S>,
    sections: SectionAssigner<S>,
    progress: ProgressTracker<S>,
    recorder: AnnotationRecorder<S>,
}

impl<S: Store> Coordinator<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let form = Arc::new(config.form);
        Self {
            leases: LeaseManager::new(Arc::clone(&store), config.lease_duration),
            sections: SectionAssigner::new(Arc::clone(&store)),
            progress: ProgressTracker::new(Arc::clone(&store), config.mode),
            recorder: AnnotationRecorder::new(Arc::clone(&store), form, config.mode),
            mode: config.mode,
            store,
        }
    }

    pub fn mode(&self) -> AssignmentMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn leases(&self) -> &LeaseManager<S> {
        &self.leases
    }

    pub fn sections(&self) -> &SectionAssigner<S> {
        &self.sections
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        traced("list_batches", "", "", self.store.list_batches()).await
    }

    /// Every batch paired with its progress, for a batch picker.
    pub async fn list_batches_with_progress(&self) -> Result<Vec<(Batch, BatchProgress)>> {
        traced("list_batches_with_progress", "", "", async {
            let mut listed = Vec::new();
            for batch in self.store.list_batches().await? {
                let progress = self.progress.batch_progress(&batch).await?;
                listed.push((batch, progress));
            }
            Ok(listed)
        })
        .await
    }

    pub async fn get_progress(&self, batch_id: BatchId) -> Result<BatchProgress> {
        traced("get_progress", &batch_id.to_string(), "", async {
            let batch = self.require_batch(batch_id).await?;
            self.progress.batch_progress(&batch).await
        })
        .await
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        traced("user_stats", "", user_id, self.progress.user_stats(user_id)).await
    }

    // -----------------------------------------------------------------------
    // Work assignment
    // -----------------------------------------------------------------------

    /// What the user should work on next in this batch.
    ///
    /// Unit mode resumes the user's live claim before claiming a new unit.
    /// Section mode resumes the user's unfinished section at its saved index,
    /// so repeated calls without progress return the same handle.
    pub async fn get_or_assign_work(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> Result<WorkOutcome> {
        traced("get_or_assign_work", &batch_id.to_string(), user_id, async {
            validate_user_id(user_id)?;
            let batch = self.require_batch(batch_id).await?;

            let outcome = match self.mode {
                AssignmentMode::Unit => self.assign_unit(&batch, user_id).await?,
                AssignmentMode::Section => self.assign_section(&batch, user_id).await?,
            };

            match outcome {
                WorkOutcome::Assigned(_) => self.point_at(user_id, batch.id).await?,
                WorkOutcome::Exhausted => {
                    info!(%batch_id, user_id, "batch exhausted for user");
                    self.clear_pointer_if(user_id, batch.id).await?;
                }
            }
            Ok(outcome)
        })
        .await
    }

    async fn assign_unit(&self, batch: &Batch, user_id: &str) -> Result<WorkOutcome> {
        let unit = match self.leases.held_claim(batch.id, user_id).await? {
            Some(unit) => unit,
            None => match self.leases.claim_next(batch.id, user_id).await? {
                Some(unit) => unit,
                None => return Ok(WorkOutcome::Exhausted),
            },
        };

        Ok(WorkOutcome::Assigned(WorkHandle {
            batch_id: batch.id,
            section_number: None,
            units: vec![WorkUnit::from(&unit)],
            resume_index: 0,
            lease_expires_at: unit.lease_expires_at,
        }))
    }

    async fn assign_section(&self, batch: &Batch, user_id: &str) -> Result<WorkOutcome> {
        let Some(grant) = self.sections.get_or_assign_section(batch, user_id).await? else {
            return Ok(WorkOutcome::Exhausted);
        };

        let range = section_range(batch, grant.section_number)?;
        let units = self
            .store
            .units_in_range(batch.id, range.start, range.end)
            .await?;
        if units.is_empty() {
            return Ok(WorkOutcome::Exhausted);
        }

        Ok(WorkOutcome::Assigned(WorkHandle {
            batch_id: batch.id,
            section_number: Some(grant.section_number),
            resume_index: grant.resume_index.min(units.len()),
            units: units.iter().map(WorkUnit::from).collect(),
            lease_expires_at: None,
        }))
    }

    /// Retire a completed section and hand out the next free one. In unit
    /// mode there is nothing to retire and this is the same as
    /// [`get_or_assign_work`](Self::get_or_assign_work).
    pub async fn next_section(&self, batch_id: BatchId, user_id: &str) -> Result<WorkOutcome> {
        if self.mode == AssignmentMode::Section {
            traced("next_section", &batch_id.to_string(), user_id, async {
                let batch = self.require_batch(batch_id).await?;
                self.sections.finish_section(&batch, user_id).await
            })
            .await?;
        }
        self.get_or_assign_work(batch_id, user_id).await
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Record a decision and advance the user past it.
    ///
    /// In section mode the unit must lie in the user's active section, and
    /// progress is set to just past that unit's offset: submitting the same
    /// decision twice leaves the index where one submit put it.
    pub async fn record_decision(
        &self,
        batch_id: BatchId,
        user_id: &str,
        decision: Decision,
    ) -> Result<Annotation> {
        traced("record_decision", &batch_id.to_string(), user_id, async {
            let batch = self.require_batch(batch_id).await?;
            let unit = self.recorder.check(batch.id, user_id, &decision).await?;

            match self.mode {
                AssignmentMode::Unit => self.recorder.record(&unit, user_id, decision).await,
                AssignmentMode::Section => {
                    let assignment = self
                        .sections
                        .active(batch.id, user_id)
                        .await?
                        .ok_or_else(|| {
                            Error::NotFound(format!(
                                "no active section for {user_id} in batch {batch_id}"
                            ))
                        })?;
                    let range = section_range(&batch, assignment.section_number)?;
                    let offset = range.offset_of(unit.original_index).ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "unit {} is not in section {}",
                            unit.id, assignment.section_number
                        ))
                    })?;

                    let annotation = self.recorder.record(&unit, user_id, decision).await?;
                    self.sections.advance(batch.id, user_id, offset + 1).await?;
                    Ok(annotation)
                }
            }
        })
        .await
    }

    /// Pass on the current unit without a decision. Unit mode releases the
    /// user's claim; section mode moves the progress index forward by one.
    /// Nothing to skip is not an error.
    pub async fn skip_current(&self, batch_id: BatchId, user_id: &str) -> Result<()> {
        traced("skip_current", &batch_id.to_string(), user_id, async {
            validate_user_id(user_id)?;
            let batch = self.require_batch(batch_id).await?;

            match self.mode {
                AssignmentMode::Unit => {
                    if let Some(unit) = self.leases.held_claim(batch.id, user_id).await? {
                        self.leases.release(unit.id, user_id).await?;
                    }
                }
                AssignmentMode::Section => {
                    if self.sections.active(batch.id, user_id).await?.is_some() {
                        self.sections.skip(&batch, user_id).await?;
                    }
                }
            }
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // User batch pointer
    // -----------------------------------------------------------------------

    /// The batch the user was last working in, if it still exists.
    pub async fn active_batch(&self, user_id: &str) -> Result<Option<Batch>> {
        traced("active_batch", "", user_id, async {
            validate_user_id(user_id)?;
            let Some(pointer) = self.store.get_pointer(user_id).await? else {
                return Ok(None);
            };
            let batch = self.store.get_batch(pointer.batch_id).await?;
            if batch.is_none() {
                self.store.clear_pointer(user_id).await?;
            }
            Ok(batch)
        })
        .await
    }

    pub async fn select_batch(&self, user_id: &str, batch_id: BatchId) -> Result<Batch> {
        traced("select_batch", &batch_id.to_string(), user_id, async {
            validate_user_id(user_id)?;
            let batch = self.require_batch(batch_id).await?;
            self.store.set_pointer(user_id, batch.id).await?;
            Ok(batch)
        })
        .await
    }

    /// Leave the current batch. Any section the user owns stays theirs.
    pub async fn abandon_batch(&self, user_id: &str) -> Result<()> {
        traced("abandon_batch", "", user_id, async {
            validate_user_id(user_id)?;
            self.store.clear_pointer(user_id).await
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Create a batch and load its units in order.
    pub async fn ingest_batch(
        &self,
        name: &str,
        description: &str,
        texts: &[String],
    ) -> Result<Batch> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("batch name is required".to_string()));
        }
        let batch = self.store.create_batch(name, description).await?;
        self.store.append_units(batch.id, texts).await?;
        info!(batch_id = %batch.id, name, units = texts.len(), "batch ingested");
        self.require_batch(batch.id).await
    }

    async fn require_batch(&self, batch_id: BatchId) -> Result<Batch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))
    }

    async fn point_at(&self, user_id: &str, batch_id: BatchId) -> Result<()> {
        let current = self.store.get_pointer(user_id).await?;
        if current.is_none_or(|p| p.batch_id != batch_id) {
            self.store.set_pointer(user_id, batch_id).await?;
        }
        Ok(())
    }

    async fn clear_pointer_if(&self, user_id: &str, batch_id: BatchId) -> Result<()> {
        let current = self.store.get_pointer(user_id).await?;
        if current.is_some_and(|p| p.batch_id == batch_id) {
            self.store.clear_pointer(user_id).await?;
        }
        Ok(())
    }
}
