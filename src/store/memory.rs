//! In-process store.
//!
//! Every operation runs inside one critical section over all tables, which
//! gives the same all-or-nothing conditional writes the Postgres backend gets
//! from row locks and unique indexes. Used by tests and single-process runs.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Store, claim_not_held};
use crate::error::{Error, Result};
use crate::model::*;

#[derive(Default)]
struct Tables {
    batches: Vec<Batch>,
    units: HashMap<UnitId, Unit>,
    /// Unit IDs per batch in `original_index` order.
    batch_units: HashMap<BatchId, Vec<UnitId>>,
    assignments: Vec<Assignment>,
    annotations: Vec<Annotation>,
    pointers: HashMap<String, UserBatchPointer>,
}

impl Tables {
    fn ordered_units(&self, batch_id: BatchId) -> impl Iterator<Item = &Unit> {
        self.batch_units
            .get(&batch_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.units.get(id))
    }

    fn active_assignment_mut(
        &mut self,
        batch_id: BatchId,
        user_id: &str,
    ) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.batch_id == batch_id && a.user_id == user_id && !a.finished)
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| Error::Other(format!("memory store lock poisoned: {e}")))
    }
}

impl Store for MemoryStore {
    async fn list_batches(&self) -> Result<Vec<Batch>> {
        Ok(self.tables()?.batches.clone())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        Ok(self.tables()?.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn create_batch(&self, name: &str, description: &str) -> Result<Batch> {
        let batch = Batch {
            id: BatchId::new(),
            name: name.to_string(),
            description: description.to_string(),
            total_unit_count: 0,
        };
        let mut tables = self.tables()?;
        tables.batches.push(batch.clone());
        tables.batch_units.insert(batch.id, Vec::new());
        Ok(batch)
    }

    async fn append_units(&self, batch_id: BatchId, texts: &[String]) -> Result<Vec<Unit>> {
        let mut tables = self.tables()?;
        let batch = tables
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))?;

        let first_index = batch.total_unit_count;
        batch.total_unit_count += texts.len();

        let units: Vec<Unit> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Unit {
                id: UnitId::new(),
                batch_id,
                text: text.clone(),
                original_index: first_index + i,
                state: UnitState::Unassigned,
                assignee: None,
                claimed_at: None,
                lease_expires_at: None,
            })
            .collect();

        for unit in &units {
            tables.units.insert(unit.id, unit.clone());
            tables.batch_units.entry(batch_id).or_default().push(unit.id);
        }
        Ok(units)
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>> {
        Ok(self.tables()?.units.get(&id).cloned())
    }

    async fn units_in_range(
        &self,
        batch_id: BatchId,
        start: usize,
        end: usize,
    ) -> Result<Vec<Unit>> {
        let tables = self.tables()?;
        Ok(tables
            .ordered_units(batch_id)
            .filter(|u| (start..=end).contains(&u.original_index))
            .cloned()
            .collect())
    }

    async fn count_annotated_units(&self, batch_id: BatchId) -> Result<usize> {
        let tables = self.tables()?;
        Ok(tables
            .ordered_units(batch_id)
            .filter(|u| u.state == UnitState::Annotated)
            .count())
    }

    async fn claim_next_unit(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<ClaimGrant>> {
        let mut tables = self.tables()?;
        let Some(id) = tables
            .ordered_units(batch_id)
            .find(|u| u.is_claimable(now))
            .map(|u| u.id)
        else {
            return Ok(None);
        };

        let unit = tables
            .units
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("unit {id}")))?;
        let previous_state = unit.state;
        unit.transition_to(UnitState::Claimed)?;
        let reclaimed_from = match previous_state {
            UnitState::Claimed => unit.assignee.take(),
            _ => None,
        };
        unit.assignee = Some(user_id.to_string());
        unit.claimed_at = Some(now);
        unit.lease_expires_at = Some(now + lease);

        Ok(Some(ClaimGrant {
            unit: unit.clone(),
            reclaimed_from,
        }))
    }

    async fn held_claim(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Unit>> {
        let tables = self.tables()?;
        Ok(tables
            .ordered_units(batch_id)
            .find(|u| u.is_held_by(user_id, now))
            .cloned())
    }

    async fn release_unit(&self, unit_id: UnitId, user_id: &str) -> Result<bool> {
        let mut tables = self.tables()?;
        let Some(unit) = tables.units.get_mut(&unit_id) else {
            return Ok(false);
        };
        if unit.state != UnitState::Claimed || unit.assignee.as_deref() != Some(user_id) {
            return Ok(false);
        }
        unit.transition_to(UnitState::Unassigned)?;
        unit.assignee = None;
        unit.claimed_at = None;
        unit.lease_expires_at = None;
        Ok(true)
    }

    async fn active_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
    ) -> Result<Option<Assignment>> {
        Ok(self
            .tables()?
            .active_assignment_mut(batch_id, user_id)
            .cloned())
    }

    async fn owned_sections(&self, batch_id: BatchId) -> Result<Vec<usize>> {
        let tables = self.tables()?;
        let mut sections: Vec<usize> = tables
            .assignments
            .iter()
            .filter(|a| a.batch_id == batch_id)
            .map(|a| a.section_number)
            .collect();
        sections.sort_unstable();
        Ok(sections)
    }

    async fn insert_assignment(
        &self,
        batch_id: BatchId,
        user_id: &str,
        section_number: usize,
        now: DateTime<Utc>,
    ) -> Result<InsertAssignment> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.active_assignment_mut(batch_id, user_id) {
            return Ok(InsertAssignment::AlreadyAssigned(existing.clone()));
        }
        if tables
            .assignments
            .iter()
            .any(|a| a.batch_id == batch_id && a.section_number == section_number)
        {
            return Ok(InsertAssignment::SectionTaken);
        }

        let assignment = Assignment {
            batch_id,
            user_id: user_id.to_string(),
            section_number,
            progress_index: 0,
            finished: false,
            assigned_at: now,
            updated_at: now,
        };
        tables.assignments.push(assignment.clone());
        Ok(InsertAssignment::Inserted(assignment))
    }

    async fn set_progress(
        &self,
        batch_id: BatchId,
        user_id: &str,
        progress_index: usize,
    ) -> Result<bool> {
        let mut tables = self.tables()?;
        let Some(assignment) = tables.active_assignment_mut(batch_id, user_id) else {
            return Ok(false);
        };
        assignment.progress_index = progress_index;
        assignment.updated_at = Utc::now();
        Ok(true)
    }

    async fn advance_progress_from(
        &self,
        batch_id: BatchId,
        user_id: &str,
        from: usize,
        to: usize,
    ) -> Result<bool> {
        let mut tables = self.tables()?;
        match tables.active_assignment_mut(batch_id, user_id) {
            Some(assignment) if assignment.progress_index == from => {
                assignment.progress_index = to;
                assignment.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_assignment(&self, batch_id: BatchId, user_id: &str) -> Result<bool> {
        let mut tables = self.tables()?;
        let Some(assignment) = tables.active_assignment_mut(batch_id, user_id) else {
            return Ok(false);
        };
        assignment.finished = true;
        assignment.updated_at = Utc::now();
        Ok(true)
    }

    async fn sum_section_progress(&self, batch_id: BatchId) -> Result<usize> {
        let tables = self.tables()?;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| a.batch_id == batch_id)
            .map(|a| a.progress_index)
            .sum())
    }

    async fn record_annotation(
        &self,
        new: &NewAnnotation,
        complete_claim_at: Option<DateTime<Utc>>,
    ) -> Result<Annotation> {
        let mut tables = self.tables()?;

        if let Some(now) = complete_claim_at {
            let unit = tables
                .units
                .get_mut(&new.unit_id)
                .ok_or_else(|| Error::NotFound(format!("unit {}", new.unit_id)))?;
            if unit.is_held_by(&new.user_id, now) {
                unit.transition_to(UnitState::Annotated)?;
                unit.lease_expires_at = None;
            } else if !unit.is_annotated_by(&new.user_id) {
                return Err(claim_not_held(unit.id, &new.user_id));
            }
        }

        let annotation = Annotation {
            id: AnnotationId::new(),
            unit_id: new.unit_id,
            batch_id: new.batch_id,
            user_id: new.user_id.clone(),
            label: new.label.clone(),
            categories: new.categories.clone(),
            notes: new.notes.clone(),
            created_at: Utc::now(),
        };
        tables.annotations.push(annotation.clone());
        Ok(annotation)
    }

    async fn annotations_by_user(&self, user_id: &str) -> Result<Vec<Annotation>> {
        Ok(self
            .tables()?
            .annotations
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_pointer(&self, user_id: &str) -> Result<Option<UserBatchPointer>> {
        Ok(self.tables()?.pointers.get(user_id).cloned())
    }

    async fn set_pointer(&self, user_id: &str, batch_id: BatchId) -> Result<()> {
        self.tables()?.pointers.insert(
            user_id.to_string(),
            UserBatchPointer {
                user_id: user_id.to_string(),
                batch_id,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear_pointer(&self, user_id: &str) -> Result<()> {
        self.tables()?.pointers.remove(user_id);
        Ok(())
    }
}
