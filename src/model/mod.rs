//! Core data model.
//!
//! A batch is an ordered collection of units (comments). Units are either
//! claimed one at a time under a lease, or read through section assignments
//! that track how far each annotator has progressed.

pub mod annotation;
pub mod assignment;
pub mod batch;

pub use annotation::*;
pub use assignment::*;
pub use batch::*;
