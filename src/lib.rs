//! # annotq
//!
//! Work distribution and progress tracking for shared annotation batches.
//!
//! Many annotators label units from the same batch without duplicating
//! effort: units are handed out under exclusive leases, or whole sections
//! are owned with a persisted progress index. Decisions are recorded once
//! per claim and rolled up into batch progress.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod lease;
pub mod model;
pub mod partition;
pub mod progress;
pub mod recorder;
pub mod section;
pub mod store;
pub mod telemetry;

pub use coordinator::{Coordinator, EngineConfig};
pub use error::{Error, Result};
