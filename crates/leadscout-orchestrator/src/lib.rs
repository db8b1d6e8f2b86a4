//! The job pipeline engine.
//!
//! [`Orchestrator`] runs the whole lifecycle: it accepts validated jobs,
//! fans discovery and enrichment tasks out over the [`TaskQueue`] lanes,
//! settles their outcomes through a single event loop, and drives each job
//! through its state machine until a terminal status. Worker tasks only
//! ever call platform adapters and record results; every job and task
//! record write happens on the engine loop, so there is exactly one writer
//! and no record-level locking.
//!
//! [`Sweeper`] is the periodic safety net: it requeues stalled tasks,
//! fails jobs that stopped making progress, enforces pending
//! cancellations, and purges old terminal jobs on a cron schedule.

/// The single-writer engine loop and job lifecycle.
pub mod engine;
/// Pipeline throughput counters.
pub mod monitor;
/// Multi-lane in-process work queue.
pub mod queue;
pub mod sweeper;
pub mod worker;

pub use engine::{
    EngineEvent, JobObserver, Orchestrator, OrchestratorConfig, OrchestratorHandle, RetryPolicy,
    SweepReport, TaskOutcome,
};
pub use monitor::{MonitorSnapshot, PipelineMonitor, StageMetrics};
pub use queue::{Lane, QueueDepths, TaskQueue, WorkItem};
pub use sweeper::{SweepConfig, Sweeper};
