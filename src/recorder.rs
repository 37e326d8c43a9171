//! Annotation recorder.
//!
//! Input is checked before anything is written. The write itself appends
//! the annotation and, in unit mode, closes the writer's claim in one
//! transaction. A retried record after a failure can still append a
//! duplicate; readers tolerate that.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::info;

use crate::config::FormConfig;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{Store, claim_not_held};
use crate::telemetry::metrics;

pub struct AnnotationRecorder<S> {
    store: Arc<S>,
    form: Arc<FormConfig>,
    mode: AssignmentMode,
}

impl<S: Store> AnnotationRecorder<S> {
    pub fn new(store: Arc<S>, form: Arc<FormConfig>, mode: AssignmentMode) -> Self {
        Self { store, form, mode }
    }

    /// Validate a decision and return the unit it refers to.
    pub async fn check(
        &self,
        batch_id: BatchId,
        user_id: &str,
        decision: &Decision,
    ) -> Result<Unit> {
        validate_user_id(user_id)?;
        self.form.validate(&decision.label, &decision.categories)?;

        let unit = self
            .store
            .get_unit(decision.unit_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("unit {}", decision.unit_id)))?;
        if unit.batch_id != batch_id {
            return Err(Error::NotFound(format!(
                "unit {} in batch {batch_id}",
                decision.unit_id
            )));
        }
        Ok(unit)
    }

    /// Persist a decision already passed through [`check`](Self::check).
    ///
    /// In unit mode only the holder of the live claim may record, plus a
    /// repeat submit from whoever already annotated the unit. The store
    /// enforces the same condition inside its transaction.
    pub async fn record(
        &self,
        unit: &Unit,
        user_id: &str,
        decision: Decision,
    ) -> Result<Annotation> {
        let complete_claim_at = match self.mode {
            AssignmentMode::Unit => {
                let now = Utc::now();
                if !unit.is_held_by(user_id, now) && !unit.is_annotated_by(user_id) {
                    return Err(claim_not_held(unit.id, user_id));
                }
                Some(now)
            }
            AssignmentMode::Section => None,
        };

        let new = NewAnnotation {
            unit_id: unit.id,
            batch_id: unit.batch_id,
            user_id: user_id.to_string(),
            label: decision.label,
            categories: decision.categories,
            notes: decision.notes,
        };
        let annotation = self
            .store
            .record_annotation(&new, complete_claim_at)
            .await?;

        info!(
            batch_id = %annotation.batch_id,
            unit_id = %annotation.unit_id,
            user_id,
            label = %annotation.label,
            "decision recorded"
        );
        metrics::annotations_recorded().add(1, &[KeyValue::new("label", annotation.label.clone())]);
        Ok(annotation)
    }
}
