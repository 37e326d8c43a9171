//! Section assignments, user batch pointers, and the work handed to a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{BatchId, Unit, UnitId};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How work is handed out. One mode per deployment: the two modes count
/// progress differently and must not be mixed over the same data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Per-unit claims bounded by a lease.
    Unit,
    /// Per-section ownership with a persisted progress index.
    #[default]
    Section,
}

impl std::fmt::Display for AssignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentMode::Unit => write!(f, "unit"),
            AssignmentMode::Section => write!(f, "section"),
        }
    }
}

impl std::str::FromStr for AssignmentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" => Ok(AssignmentMode::Unit),
            "section" => Ok(AssignmentMode::Section),
            other => Err(Error::Config(format!(
                "unknown assignment mode '{other}' (expected 'unit' or 'section')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Section assignment
// ---------------------------------------------------------------------------

/// Ownership of one section by one user.
///
/// At most one unfinished row exists per (batch, user), and at most one row
/// per (batch, section) ever. Finished rows keep the section owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub batch_id: BatchId,
    pub user_id: String,
    /// 1-indexed.
    pub section_number: usize,
    /// Offset into the section the user has completed through.
    pub progress_index: usize,
    pub finished: bool,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an attempt to insert a section assignment.
#[derive(Debug, Clone)]
pub enum InsertAssignment {
    Inserted(Assignment),
    /// Another user owns the section. Pick another candidate.
    SectionTaken,
    /// The user already holds an unfinished section in this batch.
    AlreadyAssigned(Assignment),
}

/// A section handed to a user, fresh or resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionGrant {
    pub section_number: usize,
    pub resume_index: usize,
    pub resumed: bool,
}

// ---------------------------------------------------------------------------
// User batch pointer
// ---------------------------------------------------------------------------

/// Which batch a user was last working in, so a reconnect can resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBatchPointer {
    pub user_id: String,
    pub batch_id: BatchId,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Work handed to the shell
// ---------------------------------------------------------------------------

/// The slice of a unit the presentation shell needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub id: UnitId,
    pub text: String,
    pub original_index: usize,
}

impl From<&Unit> for WorkUnit {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            text: unit.text.clone(),
            original_index: unit.original_index,
        }
    }
}

/// What a user should work on next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkHandle {
    pub batch_id: BatchId,
    /// Set in section mode only.
    pub section_number: Option<usize>,
    pub units: Vec<WorkUnit>,
    pub resume_index: usize,
    /// Set in unit mode only.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl WorkHandle {
    /// Every unit in the handle has been decided or skipped.
    pub fn is_complete(&self) -> bool {
        self.resume_index >= self.units.len()
    }

    /// The unit at the resume position, if any remain.
    pub fn current(&self) -> Option<&WorkUnit> {
        self.units.get(self.resume_index)
    }
}

/// Answer to "what should this user work on next?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkOutcome {
    Assigned(WorkHandle),
    /// Nothing left for this user in the batch. A normal terminal outcome.
    Exhausted,
}

impl WorkOutcome {
    pub fn handle(&self) -> Option<&WorkHandle> {
        match self {
            WorkOutcome::Assigned(handle) => Some(handle),
            WorkOutcome::Exhausted => None,
        }
    }
}

/// User IDs are opaque, but never blank.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidInput("user id is required".to_string()));
    }
    Ok(())
}
