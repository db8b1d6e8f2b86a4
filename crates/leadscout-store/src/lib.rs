//! Storage for jobs, tasks, accumulated leads, and exports.
//!
//! [`JobStore`] is the authoritative record of jobs and tasks; the queue
//! only ever carries identifiers. [`ResultStore`] accumulates deduplicated,
//! scored leads per job and freezes them when the job reaches a terminal
//! state. [`ExportStore`] renders frozen results to downloadable files with
//! a retention window.

/// Rendering frozen results to downloadable CSV and JSON files.
pub mod exports;
/// Canonical lead identity keys for deduplication.
pub mod identity;
/// Authoritative job and task records.
pub mod jobs;
/// Deduplicated, scored lead accumulation per job.
pub mod results;
/// Lead confidence scoring.
pub mod score;

pub use exports::{ExportFormat, ExportRecord, ExportStore};
pub use identity::identity_key;
pub use jobs::{JobStore, MemoryJobStore};
pub use results::{MergeOutcome, ResultStore};
pub use score::confidence_score;
