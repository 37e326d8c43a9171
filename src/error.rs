//! Error types for annotq.
//!
//! Exhaustion and lost races are not errors: they surface as `None` /
//! [`WorkOutcome::Exhausted`](crate::model::WorkOutcome) or are retried inside
//! the claim logic. What remains here is invalid input, missing records,
//! and storage failures.

use thiserror::Error;

use crate::model::UnitState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid unit transition: {from} -> {to}")]
    InvalidTransition { from: UnitState, to: UnitState },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transient failures the caller may retry. No state was mutated.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref().is_some_and(is_transient_sqlstate)
            }
            Error::Storage(e) => !matches!(
                e,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::TypeNotFound { .. }
                    | sqlx::Error::Decode(_)
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// SQLSTATE classes worth retrying: transaction rollback (serialization
/// failure, deadlock), connection exceptions, insufficient resources, and
/// operator intervention (e.g. admin shutdown). Constraint violations (class
/// 23) and everything else are rejections.
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("40" | "08" | "53" | "57"))
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_are_not_transient() {
        for code in ["23505", "23503", "23514", "23502", "42P01"] {
            assert!(!is_transient_sqlstate(code), "{code}");
        }
        for code in ["40001", "40P01", "08006", "53300", "57P01"] {
            assert!(is_transient_sqlstate(code), "{code}");
        }
    }

    #[test]
    fn storage_and_io_retryability() {
        assert!(Error::Storage(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::Storage(sqlx::Error::RowNotFound).is_retryable());
        assert!(Error::Io(std::io::Error::other("reset")).is_retryable());
        assert!(!Error::InvalidInput("label is required".to_string()).is_retryable());
    }
}
