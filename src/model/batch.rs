//! Batches, units and the unit lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Newtype for batch IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

/// Newtype for unit IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("bad batch id '{s}': {e}")))
    }
}

impl std::str::FromStr for UnitId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("bad unit id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A named, ordered collection of units.
///
/// Immutable after creation except `total_unit_count`, which only grows
/// when units are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub name: String,
    pub description: String,
    pub total_unit_count: usize,
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// One piece of content to be labeled.
///
/// Units are never deleted, only transitioned. The claim fields are only
/// populated while `state` is [`UnitState::Claimed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub batch_id: BatchId,
    pub text: String,
    /// Position in the batch's total order. Drives partitioning and claim order.
    pub original_index: usize,
    pub state: UnitState,
    pub assignee: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl Unit {
    /// Whether a claim attempt at `now` may take this unit.
    ///
    /// A claimed unit whose lease has run out is as good as unassigned.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            UnitState::Unassigned => true,
            UnitState::Claimed => self.lease_expires_at.is_none_or(|at| at <= now),
            UnitState::Annotated => false,
        }
    }

    /// Whether `user_id` holds a claim on this unit that is still live at `now`.
    pub fn is_held_by(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.state == UnitState::Claimed
            && self.assignee.as_deref() == Some(user_id)
            && self.lease_expires_at.is_some_and(|at| at > now)
    }

    /// Whether `user_id` already recorded the decision that closed this unit.
    pub fn is_annotated_by(&self, user_id: &str) -> bool {
        self.state == UnitState::Annotated && self.assignee.as_deref() == Some(user_id)
    }

    /// Move to `to`, rejecting moves the lifecycle does not allow.
    pub fn transition_to(&mut self, to: UnitState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Lifecycle state of a unit in unit (fine-grained) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Free for anyone to claim.
    Unassigned,
    /// Held by one annotator until the lease expires.
    Claimed,
    /// A decision was recorded. Terminal.
    Annotated,
}

impl UnitState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, to),
            (Unassigned, Claimed)
                | (Claimed, Claimed)    // expired lease taken over
                | (Claimed, Unassigned) // released
                | (Claimed, Annotated)
        )
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitState::Unassigned => "unassigned",
            UnitState::Claimed => "claimed",
            UnitState::Annotated => "annotated",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UnitState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unassigned" => Ok(UnitState::Unassigned),
            "claimed" => Ok(UnitState::Claimed),
            "annotated" => Ok(UnitState::Annotated),
            other => Err(Error::Other(format!("unknown unit state: {other}"))),
        }
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimGrant {
    pub unit: Unit,
    /// Previous holder when an expired lease was taken over.
    pub reclaimed_from: Option<String>,
}
