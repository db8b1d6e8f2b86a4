use crate::types::{Platform, SearchCriteria};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a job.
///
/// Transitions are monotonic: once terminal, a job never changes again.
/// The legal graph is encoded in [`JobStatus::can_transition_to`] and every
/// status write in the engine goes through [`JobRecord::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted and waiting for a worker to start discovery.
    Queued,
    /// Discovery tasks dispatched, fan-in not yet complete.
    Discovering,
    /// Enrichment tasks dispatched, fan-in not yet complete.
    Enriching,
    /// Terminal: pipeline finished, results frozen.
    Completed,
    /// Terminal: no discovery succeeded or the job went stale.
    Failed,
    /// Terminal: cancelled on user request.
    Cancelled,
}

impl JobStatus {
    /// True for states that never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::{Cancelled, Completed, Discovering, Enriching, Failed, Queued};
        matches!(
            (self, next),
            (Queued, Discovering)
                | (Discovering, Enriching)
                | (Discovering, Completed)
                | (Enriching, Completed)
                | (Queued | Discovering | Enriching, Failed)
                | (Queued | Discovering | Enriching, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Discovering => "discovering",
            JobStatus::Enriching => "enriching",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Pipeline stage a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Candidate discovery.
    Discovery,
    /// Attribute enrichment.
    Enrichment,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Discovery => write!(f, "discovery"),
            Stage::Enrichment => write!(f, "enrichment"),
        }
    }
}

/// Fan-in accounting for one stage of one job.
///
/// The stage barrier is pure counter arithmetic: it closes exactly when
/// every dispatched task has settled. Tasks that are being retried stay
/// outstanding, so a stage cannot close under a pending retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Tasks handed to the queue for this stage.
    pub dispatched: u32,
    /// Tasks that settled successfully.
    pub succeeded: u32,
    /// Tasks that settled in failure (retry budget spent) or were skipped.
    pub failed: u32,
}

impl StageProgress {
    /// Tasks dispatched but not yet settled.
    pub fn outstanding(&self) -> u32 {
        self.dispatched.saturating_sub(self.succeeded + self.failed)
    }

    /// True when every dispatched task has settled.
    ///
    /// A stage with nothing dispatched is trivially settled; callers only
    /// consult the barrier after dispatching.
    pub fn is_settled(&self) -> bool {
        self.succeeded + self.failed >= self.dispatched
    }
}

/// Per-stage progress counters carried on the job record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    /// Discovery stage accounting.
    pub discovery: StageProgress,
    /// Enrichment stage accounting.
    pub enrichment: StageProgress,
}

impl StageCounters {
    /// Counters for the given stage.
    pub fn stage(&self, stage: Stage) -> &StageProgress {
        match stage {
            Stage::Discovery => &self.discovery,
            Stage::Enrichment => &self.enrichment,
        }
    }

    /// Mutable counters for the given stage.
    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageProgress {
        match stage {
            Stage::Discovery => &mut self.discovery,
            Stage::Enrichment => &mut self.enrichment,
        }
    }
}

/// A job as tracked by the store and mutated only by the engine loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier.
    pub id: Uuid,
    /// The validated request this job executes.
    pub criteria: SearchCriteria,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Fan-in counters per stage.
    #[serde(default)]
    pub stages: StageCounters,
    /// Set by cancellation; enforced at the next barrier or sweep.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Terminal error description, set for Failed and Cancelled.
    #[serde(default)]
    pub error: Option<String>,
    /// Leads retained at completion, denormalized for listings.
    #[serde(default)]
    pub results_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last engine-applied change, used for staleness detection.
    pub updated_at: DateTime<Utc>,
    /// When discovery began.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A fresh job in `Queued` state.
    pub fn new(criteria: SearchCriteria) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            criteria,
            status: JobStatus::Queued,
            stages: StageCounters::default(),
            cancel_requested: false,
            error: None,
            results_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Bump the activity timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Apply a status transition if it is legal.
    ///
    /// Stamps `started_at` on leaving `Queued` and `completed_at` on
    /// entering a terminal state. Returns false and leaves the record
    /// untouched when the transition is not in the graph.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        if self.status == JobStatus::Queued && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    /// True when no engine activity has touched the job within `timeout`.
    ///
    /// Terminal jobs are never stale.
    pub fn is_stale(&self, timeout: std::time::Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let elapsed = Utc::now().signed_duration_since(self.updated_at);
        chrono::Duration::from_std(timeout)
            .map(|t| elapsed > t)
            .unwrap_or(false)
    }

    /// Stage currently running, if the job is mid-pipeline.
    pub fn current_stage(&self) -> Option<Stage> {
        match self.status {
            JobStatus::Discovering => Some(Stage::Discovery),
            JobStatus::Enriching => Some(Stage::Enrichment),
            _ => None,
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue (initial state, and again between retries).
    Pending,
    /// Claimed by a worker.
    Running,
    /// Terminal: adapter call succeeded and output was recorded.
    Succeeded,
    /// Terminal: failed with the retry budget spent, or failed fast.
    Failed,
    /// Terminal: dropped without an adapter call because the job was
    /// cancelled or already terminal.
    Skipped,
}

impl TaskStatus {
    /// True for states that never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// What a task asks its platform adapter to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskPayload {
    /// Search for candidates, returning at most `budget` of them.
    Discover {
        /// Per-task share of the job's `max_results`.
        budget: u32,
    },
    /// Fetch additional attributes for one already-discovered lead.
    Enrich {
        /// Dedup key of the lead to enrich.
        identity_key: String,
    },
}

impl TaskPayload {
    /// Stage this payload belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            TaskPayload::Discover { .. } => Stage::Discovery,
            TaskPayload::Enrich { .. } => Stage::Enrichment,
        }
    }
}

/// One unit of platform work, owned by exactly one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// Platform the adapter call targets.
    pub platform: Platform,
    /// The work to perform.
    pub payload: TaskPayload,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Attempts started so far; the first run makes this 1.
    pub attempt_count: u32,
    /// Most recent failure message, kept across retries.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Items produced by the successful attempt (candidates or fields).
    #[serde(default)]
    pub produced: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the current attempt started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task settled.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(job_id: Uuid, platform: Platform, payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            platform,
            payload,
            status: TaskStatus::Pending,
            attempt_count: 0,
            last_error: None,
            produced: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A pending discovery task.
    pub fn new_discovery(job_id: Uuid, platform: Platform, budget: u32) -> Self {
        Self::new(job_id, platform, TaskPayload::Discover { budget })
    }

    /// A pending enrichment task.
    pub fn new_enrichment(
        job_id: Uuid,
        platform: Platform,
        identity_key: impl Into<String>,
    ) -> Self {
        Self::new(
            job_id,
            platform,
            TaskPayload::Enrich {
                identity_key: identity_key.into(),
            },
        )
    }

    /// Stage this task belongs to.
    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }

    /// True when the current attempt has run past `timeout`.
    ///
    /// Only meaningful for `Running` tasks; anything else returns false.
    pub fn is_stalled(&self, timeout: std::time::Duration) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        let Some(started) = self.started_at else {
            return false;
        };
        let elapsed = Utc::now().signed_duration_since(started);
        chrono::Duration::from_std(timeout)
            .map(|t| elapsed > t)
            .unwrap_or(false)
    }
}
