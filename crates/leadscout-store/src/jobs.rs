use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadscout_core::{
    JobRecord, JobStatus, LeadScoutError, LeadScoutResult, TaskRecord, TaskStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Authoritative storage for jobs and their tasks.
///
/// The engine is the only writer; workers and the gateway read. Updates
/// replace the whole record, which is safe under the single-writer rule.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert_job(&self, job: &JobRecord) -> LeadScoutResult<()>;
    /// Fetch a job by id.
    async fn get_job(&self, id: Uuid) -> LeadScoutResult<Option<JobRecord>>;
    /// Replace an existing job record.
    async fn update_job(&self, job: &JobRecord) -> LeadScoutResult<()>;
    /// List jobs newest-first, optionally filtered by status.
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        offset: usize,
        limit: usize,
    ) -> LeadScoutResult<Vec<JobRecord>>;
    /// Jobs currently in a non-terminal state.
    async fn active_job_count(&self) -> LeadScoutResult<usize>;
    /// Number of jobs per status.
    async fn status_counts(&self) -> LeadScoutResult<HashMap<JobStatus, usize>>;
    /// Terminal jobs that finished before `cutoff`, for retention sweeps.
    async fn terminal_jobs_before(&self, cutoff: DateTime<Utc>) -> LeadScoutResult<Vec<Uuid>>;
    /// Remove a job and all of its tasks. Returns whether it existed.
    async fn delete_job(&self, id: Uuid) -> LeadScoutResult<bool>;

    /// Persist a new task.
    async fn insert_task(&self, task: &TaskRecord) -> LeadScoutResult<()>;
    /// Fetch a task by id.
    async fn get_task(&self, id: Uuid) -> LeadScoutResult<Option<TaskRecord>>;
    /// Replace an existing task record.
    async fn update_task(&self, task: &TaskRecord) -> LeadScoutResult<()>;
    /// All tasks belonging to `job_id`, oldest-first.
    async fn tasks_for_job(&self, job_id: Uuid) -> LeadScoutResult<Vec<TaskRecord>>;
    /// Every task currently in `Running` state, across all jobs.
    async fn running_tasks(&self) -> LeadScoutResult<Vec<TaskRecord>>;
}

/// In-memory store backing a single-process deployment.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl MemoryJobStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &JobRecord) -> LeadScoutResult<()> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> LeadScoutResult<Option<JobRecord>> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn update_job(&self, job: &JobRecord) -> LeadScoutResult<()> {
        let mut jobs = self.jobs.write();
        if !jobs.contains_key(&job.id) {
            return Err(LeadScoutError::Store(format!(
                "job {} updated before insert",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        offset: usize,
        limit: usize,
    ) -> LeadScoutResult<Vec<JobRecord>> {
        let jobs = self.jobs.read();
        let mut all: Vec<JobRecord> = jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn active_job_count(&self) -> LeadScoutResult<usize> {
        Ok(self
            .jobs
            .read()
            .values()
            .filter(|j| !j.status.is_terminal())
            .count())
    }

    async fn status_counts(&self) -> LeadScoutResult<HashMap<JobStatus, usize>> {
        let mut counts = HashMap::new();
        for job in self.jobs.read().values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn terminal_jobs_before(&self, cutoff: DateTime<Utc>) -> LeadScoutResult<Vec<Uuid>> {
        Ok(self
            .jobs
            .read()
            .values()
            .filter(|j| j.status.is_terminal())
            .filter(|j| j.completed_at.is_some_and(|at| at < cutoff))
            .map(|j| j.id)
            .collect())
    }

    async fn delete_job(&self, id: Uuid) -> LeadScoutResult<bool> {
        let existed = self.jobs.write().remove(&id).is_some();
        if existed {
            self.tasks.write().retain(|_, t| t.job_id != id);
        }
        Ok(existed)
    }

    async fn insert_task(&self, task: &TaskRecord) -> LeadScoutResult<()> {
        self.tasks.write().insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> LeadScoutResult<Option<TaskRecord>> {
        Ok(self.tasks.read().get(&id).cloned())
    }

    async fn update_task(&self, task: &TaskRecord) -> LeadScoutResult<()> {
        let mut tasks = self.tasks.write();
        if !tasks.contains_key(&task.id) {
            return Err(LeadScoutError::Store(format!(
                "task {} updated before insert",
                task.id
            )));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn tasks_for_job(&self, job_id: Uuid) -> LeadScoutResult<Vec<TaskRecord>> {
        let tasks = self.tasks.read();
        let mut out: Vec<TaskRecord> = tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn running_tasks(&self) -> LeadScoutResult<Vec<TaskRecord>> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect())
    }
}
