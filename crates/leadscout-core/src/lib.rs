//! Core types and error definitions for the LeadScout pipeline.
//!
//! This crate provides the foundational types shared across all LeadScout
//! crates: the unified error enum, search criteria and platform enumerations,
//! and the Job/Task/Lead records that the orchestration pipeline moves
//! through its stages.
//!
//! # Main types
//!
//! - [`LeadScoutError`] — Unified error enum for all LeadScout subsystems.
//! - [`LeadScoutResult`] — Convenience alias for `Result<T, LeadScoutError>`.
//! - [`SearchCriteria`] — A validated lead-generation request.
//! - [`JobRecord`] / [`TaskRecord`] — The orchestrator's unit of lifecycle
//!   and unit of work.
//! - [`Lead`] — One deduplicated, scored business record.

/// Job and Task records plus the status machinery shared by the store,
/// orchestrator, and gateway.
pub mod job;
/// Domain types: platforms, intensity, criteria, candidates, and leads.
pub mod types;

pub use job::{
    JobRecord, JobStatus, Stage, StageCounters, StageProgress, TaskPayload, TaskRecord, TaskStatus,
};
pub use types::{AttributeSet, Candidate, Intensity, Lead, LeadField, Platform, SearchCriteria};

// --- Error types ---

/// Top-level error type for the LeadScout pipeline.
///
/// The first group of variants mirrors the caller-visible error taxonomy
/// (validation, lookup, platform, retry, and job-level failures); the rest
/// cover ambient concerns of the surrounding crates.
#[derive(Debug, thiserror::Error)]
pub enum LeadScoutError {
    /// Bad job criteria, rejected synchronously at submission.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown job or export identifier.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An external platform could not be invoked (network failure,
    /// open circuit breaker, missing adapter, or attempt timeout).
    #[error("Platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// A task exhausted its retry budget; recorded on the task, not
    /// necessarily fatal to the owning job.
    #[error("Retry budget exhausted: {0}")]
    RetryExhausted(String),

    /// The job as a whole failed (no platform produced any candidates).
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The scheduler forced a stale job into a terminal state.
    #[error("Job timed out: {0}")]
    JobTimedOut(String),

    /// The job was cancelled at the caller's request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Job creation refused because the active-job ceiling is reached.
    #[error("Overloaded: {0}")]
    Overloaded(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the job or result store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error while materializing or serving an export snapshot.
    #[error("Export error: {0}")]
    Export(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`LeadScoutError`].
pub type LeadScoutResult<T> = Result<T, LeadScoutError>;
