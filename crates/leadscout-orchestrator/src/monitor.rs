use leadscout_core::{JobStatus, Stage};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cumulative task counters for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageMetrics {
    /// Attempts started.
    pub started: u64,
    /// Tasks settled successfully.
    pub succeeded: u64,
    /// Tasks settled in failure.
    pub failed: u64,
    /// Tasks dropped because their job was cancelled or finished.
    pub skipped: u64,
    /// Attempts requeued for retry.
    pub retried: u64,
    /// Items produced by successful attempts (candidates or merged fields).
    pub produced: u64,
    /// Total attempt wall time.
    pub duration_ms: u64,
}

#[derive(Default)]
struct MonitorState {
    stages: HashMap<Stage, StageMetrics>,
    jobs_created: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    jobs_cancelled: u64,
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    /// Discovery stage counters.
    pub discovery: StageMetrics,
    /// Enrichment stage counters.
    pub enrichment: StageMetrics,
    /// Jobs accepted since startup.
    pub jobs_created: u64,
    /// Jobs that reached `Completed`.
    pub jobs_completed: u64,
    /// Jobs that reached `Failed`.
    pub jobs_failed: u64,
    /// Jobs that reached `Cancelled`.
    pub jobs_cancelled: u64,
}

/// Tracks cumulative pipeline metrics for the stats endpoint.
pub struct PipelineMonitor {
    state: RwLock<MonitorState>,
}

impl PipelineMonitor {
    /// A monitor with all counters at zero.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MonitorState::default()),
        }
    }

    /// Record a job being accepted.
    pub async fn job_created(&self) {
        self.state.write().await.jobs_created += 1;
    }

    /// Record a job reaching a terminal status.
    pub async fn job_finished(&self, status: JobStatus) {
        let mut state = self.state.write().await;
        match status {
            JobStatus::Completed => state.jobs_completed += 1,
            JobStatus::Failed => state.jobs_failed += 1,
            JobStatus::Cancelled => state.jobs_cancelled += 1,
            _ => {}
        }
    }

    /// Record an attempt starting.
    pub async fn task_started(&self, stage: Stage) {
        let mut state = self.state.write().await;
        state.stages.entry(stage).or_default().started += 1;
    }

    /// Record a successful settlement with its output size and wall time.
    pub async fn task_succeeded(&self, stage: Stage, produced: u32, duration_ms: u64) {
        let mut state = self.state.write().await;
        let metrics = state.stages.entry(stage).or_default();
        metrics.succeeded += 1;
        metrics.produced += u64::from(produced);
        metrics.duration_ms += duration_ms;
    }

    /// Record a failed settlement.
    pub async fn task_failed(&self, stage: Stage) {
        let mut state = self.state.write().await;
        state.stages.entry(stage).or_default().failed += 1;
    }

    /// Record a task dropped without running.
    pub async fn task_skipped(&self, stage: Stage) {
        let mut state = self.state.write().await;
        state.stages.entry(stage).or_default().skipped += 1;
    }

    /// Record an attempt being requeued.
    pub async fn task_retried(&self, stage: Stage) {
        let mut state = self.state.write().await;
        state.stages.entry(stage).or_default().retried += 1;
    }

    /// Snapshot of every counter.
    pub async fn snapshot(&self) -> MonitorSnapshot {
        let state = self.state.read().await;
        MonitorSnapshot {
            discovery: state.stages.get(&Stage::Discovery).copied().unwrap_or_default(),
            enrichment: state.stages.get(&Stage::Enrichment).copied().unwrap_or_default(),
            jobs_created: state.jobs_created,
            jobs_completed: state.jobs_completed,
            jobs_failed: state.jobs_failed,
            jobs_cancelled: state.jobs_cancelled,
        }
    }

    /// The snapshot as JSON, for embedding in stats responses.
    pub async fn to_json(&self) -> serde_json::Value {
        let snapshot = self.snapshot().await;
        serde_json::json!({
            "jobs": {
                "created": snapshot.jobs_created,
                "completed": snapshot.jobs_completed,
                "failed": snapshot.jobs_failed,
                "cancelled": snapshot.jobs_cancelled,
            },
            "stages": {
                "discovery": snapshot.discovery,
                "enrichment": snapshot.enrichment,
            },
        })
    }
}

impl Default for PipelineMonitor {
    fn default() -> Self {
        Self::new()
    }
}
