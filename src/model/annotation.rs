//! Annotation records and per-user statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::batch::{BatchId, UnitId};

/// Label key used in statistics when a stored label is blank.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Newtype for annotation IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded labeling decision. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub unit_id: UnitId,
    pub batch_id: BatchId,
    pub user_id: String,
    pub label: String,
    /// Ordered free-text tags.
    pub categories: Vec<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A decision as submitted by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub unit_id: UnitId,
    pub label: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl Decision {
    pub fn new(unit_id: UnitId, label: impl Into<String>) -> Self {
        Self {
            unit_id,
            label: label.into(),
            categories: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Parameters for inserting an annotation row.
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub unit_id: UnitId,
    pub batch_id: BatchId,
    pub user_id: String,
    pub label: String,
    pub categories: Vec<String>,
    pub notes: String,
}

/// Aggregate of one user's annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_annotations: usize,
    pub counts_by_label: BTreeMap<String, usize>,
}

impl UserStats {
    /// Tally annotations by label, folding blank labels into [`UNKNOWN_LABEL`].
    pub fn tally<'a>(annotations: impl IntoIterator<Item = &'a Annotation>) -> Self {
        let mut stats = Self::default();
        for annotation in annotations {
            let label = match annotation.label.trim() {
                "" => UNKNOWN_LABEL,
                label => label,
            };
            *stats.counts_by_label.entry(label.to_string()).or_default() += 1;
            stats.total_annotations += 1;
        }
        stats
    }
}

/// Completion counts for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub annotated: usize,
}

impl BatchProgress {
    /// Fraction complete in `[0, 1]`. Empty batches report 0.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.annotated as f64 / self.total as f64
        }
    }
}
