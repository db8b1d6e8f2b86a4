use crate::monitor::PipelineMonitor;
use crate::queue::{Lane, TaskQueue, WorkItem};
use crate::worker;
use async_trait::async_trait;
use chrono::Utc;
use leadscout_core::{
    Intensity, JobRecord, JobStatus, Lead, LeadScoutError, LeadScoutResult, Platform,
    SearchCriteria, Stage, TaskRecord, TaskStatus,
};
use leadscout_platforms::AdapterRegistry;
use leadscout_store::{JobStore, ResultStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Retry budget and backoff curve for failed task attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per task before it settles as failed.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub backoff_base_ms: u64,
    /// Ceiling on the delay between attempts.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-running a task whose attempt number `attempt` just
    /// failed. Doubles per attempt, capped at `backoff_max_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let ms = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Terminal error recorded on a job cancelled at the caller's request.
fn cancel_error() -> String {
    LeadScoutError::Cancelled("by user request".to_string()).to_string()
}

/// Whether a task failure is worth another attempt.
///
/// Breaker-open and unregistered-platform failures fail fast: another
/// attempt cannot succeed until the breaker cools down, and the stage
/// barrier surfaces the job-level outcome either way.
fn is_retryable(error: &LeadScoutError) -> bool {
    match error {
        LeadScoutError::Validation(_)
        | LeadScoutError::NotFound(_)
        | LeadScoutError::Cancelled(_) => false,
        LeadScoutError::PlatformUnavailable(message) => {
            !message.contains("circuit breaker open") && !message.contains("not configured")
        }
        _ => true,
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Non-terminal jobs admitted before new submissions are refused.
    pub max_active_jobs: usize,
    /// Workers consuming the discovery lane.
    pub discovery_workers: usize,
    /// Workers consuming the enrichment lane.
    pub enrichment_workers: usize,
    /// Retry budget for task attempts.
    pub retry: RetryPolicy,
    /// Running attempt age after which the sweep considers a task stalled.
    pub task_timeout: Duration,
    /// Engine inactivity age after which the sweep fails a job.
    pub job_staleness_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_active_jobs: 5,
            discovery_workers: 4,
            enrichment_workers: 8,
            retry: RetryPolicy::default(),
            task_timeout: Duration::from_secs(120),
            job_staleness_timeout: Duration::from_secs(600),
        }
    }
}

/// Everything the engine loop reacts to.
///
/// Workers and callers never write job or task records; they send one of
/// these and the loop applies it. One consumer means there is exactly one
/// writer for the whole pipeline state.
#[derive(Debug)]
pub enum EngineEvent {
    /// A worker began an attempt.
    TaskStarted {
        /// The task.
        task_id: Uuid,
        /// Its job.
        job_id: Uuid,
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// A worker finished an attempt.
    TaskCompleted {
        /// The task.
        task_id: Uuid,
        /// Its job.
        job_id: Uuid,
        /// Attempt number the outcome belongs to.
        attempt: u32,
        /// How the attempt ended.
        outcome: TaskOutcome,
    },
    /// A caller asked for the job to stop.
    CancelRequested {
        /// The job.
        job_id: Uuid,
    },
    /// The sweeper asked for a maintenance pass.
    SweepRequested,
}

/// How one task attempt ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The adapter call succeeded and output was recorded.
    Success {
        /// Candidates accepted or fields merged.
        produced: u32,
    },
    /// The adapter call failed.
    Failure {
        /// The failure; retry eligibility is derived from it.
        error: LeadScoutError,
    },
    /// The worker dropped the task because its job was cancelled or done.
    Skipped,
}

/// Receives terminal job notifications.
///
/// Invoked on a spawned task, never on the engine loop, so
/// implementations may do slow IO.
#[async_trait]
pub trait JobObserver: Send + Sync {
    /// The job reached `Completed`, `Failed`, or `Cancelled`.
    async fn on_job_terminal(&self, job: &JobRecord);
}

/// What one maintenance sweep did.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Stalled tasks put back on their lane.
    pub tasks_requeued: usize,
    /// Stalled tasks failed with the retry budget spent.
    pub tasks_failed: usize,
    /// Jobs with a pending cancellation that were finalized.
    pub jobs_cancelled: usize,
    /// Jobs failed for inactivity.
    pub jobs_failed: usize,
}

impl SweepReport {
    /// Whether the sweep changed anything.
    pub fn acted(&self) -> bool {
        self.tasks_requeued + self.tasks_failed + self.jobs_cancelled + self.jobs_failed > 0
    }
}

/// Running pipeline handle. Signals shutdown and waits for the loop and
/// workers to drain.
pub struct OrchestratorHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Stop the engine loop and all workers.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = futures_util::future::join_all(self.handles).await;
    }
}

/// The pipeline engine.
///
/// Owns the queue, the monitor, and the event channel. All job and task
/// record writes happen on the event loop spawned by
/// [`Orchestrator::start`]; the public methods either read, or enqueue
/// work for the loop.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    results: Arc<ResultStore>,
    registry: Arc<AdapterRegistry>,
    queue: Arc<TaskQueue>,
    monitor: Arc<PipelineMonitor>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    observers: Vec<Arc<dyn JobObserver>>,
}

impl Orchestrator {
    /// Assemble an engine over the given stores and adapter registry.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        results: Arc<ResultStore>,
        registry: Arc<AdapterRegistry>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            store,
            results,
            registry,
            queue: Arc::new(TaskQueue::new()),
            monitor: Arc::new(PipelineMonitor::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            observers: Vec::new(),
        }
    }

    /// Register an observer for terminal job notifications.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The work queue.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// The pipeline metrics.
    pub fn monitor(&self) -> &Arc<PipelineMonitor> {
        &self.monitor
    }

    /// The adapter registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// The job store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// The result store.
    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// The engine configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("engine event dropped: loop stopped");
        }
    }

    /// Spawn the event loop and the worker pools.
    ///
    /// Fails if called twice.
    pub fn start(self: &Arc<Self>) -> LeadScoutResult<OrchestratorHandle> {
        let events = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| LeadScoutError::Config("orchestrator already started".into()))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();
        handles.push(tokio::spawn(
            self.clone().event_loop(events, shutdown_rx.clone()),
        ));
        handles.extend(worker::spawn_workers(
            self.clone(),
            Lane::Discovery,
            self.config.discovery_workers,
            shutdown_rx.clone(),
        ));
        handles.extend(worker::spawn_workers(
            self.clone(),
            Lane::Enrichment,
            self.config.enrichment_workers,
            shutdown_rx,
        ));
        info!(
            discovery_workers = self.config.discovery_workers,
            enrichment_workers = self.config.enrichment_workers,
            "orchestrator started"
        );
        Ok(OrchestratorHandle {
            shutdown: shutdown_tx,
            handles,
        })
    }

    // ── public job API ───────────────────────────────────────────────────

    /// Validate and accept a job, or refuse it.
    ///
    /// Refusal is either a validation failure or `Overloaded` when the
    /// active-job ceiling is reached. An accepted job is durably queued
    /// before this returns.
    pub async fn create_job(&self, criteria: SearchCriteria) -> LeadScoutResult<JobRecord> {
        criteria.validate()?;
        let active = self.store.active_job_count().await?;
        if active >= self.config.max_active_jobs {
            return Err(LeadScoutError::Overloaded(format!(
                "{active} active jobs at the limit of {}",
                self.config.max_active_jobs
            )));
        }
        let job = JobRecord::new(criteria);
        self.store.insert_job(&job).await?;
        self.results.open_job(job.id, job.criteria.max_results);
        self.queue.push(Lane::Jobs, WorkItem::StartJob(job.id));
        self.monitor.job_created().await;
        info!(
            job_id = %job.id,
            industry = %job.criteria.industry,
            location = %job.criteria.location,
            intensity = %job.criteria.intensity,
            "job accepted"
        );
        Ok(job)
    }

    /// Fetch a job.
    pub async fn get_job(&self, id: Uuid) -> LeadScoutResult<JobRecord> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| LeadScoutError::NotFound(format!("job {id}")))
    }

    /// List jobs newest-first, optionally filtered by status.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        offset: usize,
        limit: usize,
    ) -> LeadScoutResult<Vec<JobRecord>> {
        self.store.list_jobs(status, offset, limit).await
    }

    /// Current leads for a job, best first. Available while the job is
    /// still running.
    pub async fn job_results(&self, id: Uuid) -> LeadScoutResult<Vec<Lead>> {
        self.get_job(id).await?;
        Ok(self.results.leads(id))
    }

    /// Request cancellation.
    ///
    /// Terminal jobs are returned unchanged. For an active job the flag is
    /// applied by the engine loop and enforced at the next stage barrier
    /// or sweep, whichever comes first.
    pub async fn cancel_job(&self, id: Uuid) -> LeadScoutResult<JobRecord> {
        let mut job = self.get_job(id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        self.emit(EngineEvent::CancelRequested { job_id: id });
        // the durable write happens on the engine loop
        job.cancel_requested = true;
        Ok(job)
    }

    /// Ask the engine loop for a maintenance sweep.
    pub fn request_sweep(&self) {
        self.emit(EngineEvent::SweepRequested);
    }

    // ── engine loop ──────────────────────────────────────────────────────

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("engine loop started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Err(err) = self.apply_event(event).await {
                        error!(error = %err, "engine event handling failed");
                    }
                }
                item = self.queue.pull(Lane::Jobs) => {
                    match item {
                        WorkItem::StartJob(job_id) => {
                            if let Err(err) = self.start_job(job_id).await {
                                error!(job_id = %job_id, error = %err, "job start failed");
                            }
                        }
                        WorkItem::RunTask(task_id) => {
                            warn!(task_id = %task_id, "task item on the jobs lane dropped");
                        }
                    }
                }
            }
        }
        debug!("engine loop stopped");
    }

    async fn apply_event(&self, event: EngineEvent) -> LeadScoutResult<()> {
        match event {
            EngineEvent::TaskStarted {
                task_id,
                job_id,
                attempt,
            } => self.apply_started(task_id, job_id, attempt).await,
            EngineEvent::TaskCompleted {
                task_id,
                job_id,
                attempt,
                outcome,
            } => self.apply_completed(task_id, job_id, attempt, outcome).await,
            EngineEvent::CancelRequested { job_id } => self.apply_cancel(job_id).await,
            EngineEvent::SweepRequested => {
                let report = self.run_sweep().await?;
                if report.acted() {
                    info!(
                        requeued = report.tasks_requeued,
                        timed_out = report.tasks_failed,
                        cancelled = report.jobs_cancelled,
                        failed = report.jobs_failed,
                        "sweep acted"
                    );
                }
                Ok(())
            }
        }
    }

    async fn apply_started(
        &self,
        task_id: Uuid,
        job_id: Uuid,
        attempt: u32,
    ) -> LeadScoutResult<()> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            warn!(task_id = %task_id, "start event for unknown task");
            return Ok(());
        };
        // a stale start can arrive after the sweep requeued the task
        if task.status != TaskStatus::Pending || attempt != task.attempt_count + 1 {
            debug!(task_id = %task_id, status = %task.status, attempt, "stale start ignored");
            return Ok(());
        }
        task.status = TaskStatus::Running;
        task.attempt_count = attempt;
        task.started_at = Some(Utc::now());
        task.finished_at = None;
        self.store.update_task(&task).await?;
        self.monitor.task_started(task.stage()).await;
        if let Some(mut job) = self.store.get_job(job_id).await? {
            if !job.status.is_terminal() {
                job.touch();
                self.store.update_job(&job).await?;
            }
        }
        Ok(())
    }

    async fn apply_completed(
        &self,
        task_id: Uuid,
        job_id: Uuid,
        attempt: u32,
        outcome: TaskOutcome,
    ) -> LeadScoutResult<()> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            warn!(task_id = %task_id, "completion event for unknown task");
            return Ok(());
        };
        let expected = match task.status {
            TaskStatus::Running => task.attempt_count,
            // a worker can skip a claim without ever starting it
            TaskStatus::Pending => task.attempt_count + 1,
            _ => {
                debug!(task_id = %task_id, status = %task.status, "completion for settled task ignored");
                return Ok(());
            }
        };
        if attempt != expected {
            debug!(task_id = %task_id, attempt, expected, "stale completion ignored");
            return Ok(());
        }

        let stage = task.stage();
        let now = Utc::now();
        let duration_ms = task
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        match outcome {
            TaskOutcome::Success { produced } => {
                task.status = TaskStatus::Succeeded;
                task.produced = produced;
                task.last_error = None;
                task.finished_at = Some(now);
                self.store.update_task(&task).await?;
                self.monitor.task_succeeded(stage, produced, duration_ms).await;
                debug!(task_id = %task.id, job_id = %job_id, stage = %stage, produced, "task succeeded");
            }
            TaskOutcome::Failure { error } => {
                let message = error.to_string();
                task.last_error = Some(message.clone());
                if is_retryable(&error) {
                    if task.attempt_count < self.config.retry.max_attempts {
                        task.status = TaskStatus::Pending;
                        task.started_at = None;
                        self.store.update_task(&task).await?;
                        self.monitor.task_retried(stage).await;
                        let delay = self.config.retry.backoff_for(task.attempt_count);
                        warn!(
                            task_id = %task.id,
                            job_id = %job_id,
                            attempt = task.attempt_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "task failed, retrying"
                        );
                        let queue = self.queue.clone();
                        let lane = Lane::for_stage(stage);
                        let id = task.id;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            queue.push(lane, WorkItem::RunTask(id));
                        });
                        // not settled: the stage barrier keeps waiting on it
                        if let Some(mut job) = self.store.get_job(job_id).await? {
                            if !job.status.is_terminal() {
                                job.touch();
                                self.store.update_job(&job).await?;
                            }
                        }
                        return Ok(());
                    }
                    task.last_error = Some(
                        LeadScoutError::RetryExhausted(format!(
                            "{} attempts, last: {message}",
                            task.attempt_count
                        ))
                        .to_string(),
                    );
                }
                task.status = TaskStatus::Failed;
                task.finished_at = Some(now);
                self.store.update_task(&task).await?;
                self.monitor.task_failed(stage).await;
                warn!(
                    task_id = %task.id,
                    job_id = %job_id,
                    attempts = task.attempt_count,
                    error = %message,
                    "task failed permanently"
                );
            }
            TaskOutcome::Skipped => {
                task.status = TaskStatus::Skipped;
                task.last_error = Some("job cancelled".to_string());
                task.finished_at = Some(now);
                self.store.update_task(&task).await?;
                self.monitor.task_skipped(stage).await;
            }
        }

        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        match task.status {
            TaskStatus::Succeeded => job.stages.stage_mut(stage).succeeded += 1,
            TaskStatus::Failed | TaskStatus::Skipped => job.stages.stage_mut(stage).failed += 1,
            _ => {}
        }
        job.touch();
        self.check_barriers(&mut job).await?;
        self.store.update_job(&job).await?;
        Ok(())
    }

    async fn apply_cancel(&self, job_id: Uuid) -> LeadScoutResult<()> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        job.cancel_requested = true;
        if job.status == JobStatus::Queued {
            self.finalize(&mut job, JobStatus::Cancelled, Some(cancel_error()))
                .await?;
        } else {
            job.touch();
            info!(job_id = %job.id, status = %job.status, "cancellation requested");
        }
        self.store.update_job(&job).await
    }

    /// Dispatch discovery for a queued job.
    ///
    /// One task per distinct requested platform, never more tasks than
    /// `max_results`, each with an even share of the result budget.
    async fn start_job(&self, job_id: Uuid) -> LeadScoutResult<()> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            warn!(job_id = %job_id, "start item for unknown job");
            return Ok(());
        };
        if job.status != JobStatus::Queued {
            debug!(job_id = %job.id, status = %job.status, "duplicate start ignored");
            return Ok(());
        }
        if job.cancel_requested {
            self.finalize(&mut job, JobStatus::Cancelled, Some(cancel_error()))
                .await?;
            return self.store.update_job(&job).await;
        }

        let mut platforms: Vec<Platform> = Vec::new();
        for &p in &job.criteria.platforms {
            if !platforms.contains(&p) {
                platforms.push(p);
            }
        }
        let task_count = platforms.len().min(job.criteria.max_results as usize);
        let budget = job.criteria.max_results.div_ceil(task_count as u32);
        let mut task_ids = Vec::with_capacity(task_count);
        for &platform in &platforms[..task_count] {
            let task = TaskRecord::new_discovery(job.id, platform, budget);
            self.store.insert_task(&task).await?;
            task_ids.push(task.id);
        }
        job.stages.discovery.dispatched = task_ids.len() as u32;
        job.advance(JobStatus::Discovering);
        self.store.update_job(&job).await?;
        for id in task_ids {
            self.queue.push(Lane::Discovery, WorkItem::RunTask(id));
        }
        info!(
            job_id = %job.id,
            tasks = job.stages.discovery.dispatched,
            budget,
            "discovery dispatched"
        );
        Ok(())
    }

    /// Advance the job when the current stage has fully settled.
    ///
    /// The barrier is counter arithmetic only: a stage closes exactly when
    /// dispatched equals succeeded plus failed, so a retried task keeps it
    /// open. The caller persists the record.
    async fn check_barriers(&self, job: &mut JobRecord) -> LeadScoutResult<()> {
        match job.status {
            JobStatus::Discovering if job.stages.discovery.is_settled() => {
                if job.cancel_requested {
                    return self
                        .finalize(job, JobStatus::Cancelled, Some(cancel_error()))
                        .await;
                }
                if job.stages.discovery.succeeded == 0 {
                    let detail = match self.first_failure_detail(job.id, Stage::Discovery).await {
                        Some(detail) => format!("all discovery tasks failed: {detail}"),
                        None => "all discovery tasks failed".to_string(),
                    };
                    let error = LeadScoutError::JobFailed(detail);
                    return self
                        .finalize(job, JobStatus::Failed, Some(error.to_string()))
                        .await;
                }
                let platforms = self.enrichment_platforms_for(&job.criteria);
                if platforms.is_empty() || self.results.count(job.id) == 0 {
                    return self.finalize(job, JobStatus::Completed, None).await;
                }
                let dispatched = self.dispatch_enrichment(job, &platforms).await?;
                job.advance(JobStatus::Enriching);
                info!(
                    job_id = %job.id,
                    tasks = dispatched,
                    platforms = platforms.len(),
                    "enrichment dispatched"
                );
            }
            JobStatus::Enriching if job.stages.enrichment.is_settled() => {
                if job.cancel_requested {
                    return self
                        .finalize(job, JobStatus::Cancelled, Some(cancel_error()))
                        .await;
                }
                return self.finalize(job, JobStatus::Completed, None).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Platforms the enrichment stage runs on for the given request.
    ///
    /// Standard intensity uses the registered enrichment-capable platforms
    /// the request did not already search; premium uses them all.
    fn enrichment_platforms_for(&self, criteria: &SearchCriteria) -> Vec<Platform> {
        match criteria.intensity {
            Intensity::Basic => Vec::new(),
            Intensity::Standard => self
                .registry
                .enrichment_platforms()
                .into_iter()
                .filter(|p| !criteria.platforms.contains(p))
                .collect(),
            Intensity::Premium => self.registry.enrichment_platforms(),
        }
    }

    /// Fan out one enrichment task per (lead, platform) pair.
    async fn dispatch_enrichment(
        &self,
        job: &mut JobRecord,
        platforms: &[Platform],
    ) -> LeadScoutResult<u32> {
        let leads = self.results.leads(job.id);
        let mut task_ids = Vec::with_capacity(leads.len() * platforms.len());
        for lead in &leads {
            for &platform in platforms {
                let task =
                    TaskRecord::new_enrichment(job.id, platform, lead.identity_key.as_str());
                self.store.insert_task(&task).await?;
                task_ids.push(task.id);
            }
        }
        let dispatched = task_ids.len() as u32;
        job.stages.enrichment.dispatched = dispatched;
        for id in task_ids {
            self.queue.push(Lane::Enrichment, WorkItem::RunTask(id));
        }
        Ok(dispatched)
    }

    async fn first_failure_detail(&self, job_id: Uuid, stage: Stage) -> Option<String> {
        let tasks = self.store.tasks_for_job(job_id).await.ok()?;
        tasks
            .into_iter()
            .filter(|t| t.stage() == stage && t.status == TaskStatus::Failed)
            .find_map(|t| t.last_error)
    }

    /// Move a job to a terminal status, freeze its results, and notify
    /// observers. The caller persists the record.
    async fn finalize(
        &self,
        job: &mut JobRecord,
        status: JobStatus,
        error: Option<String>,
    ) -> LeadScoutResult<()> {
        if !job.advance(status) {
            warn!(job_id = %job.id, from = %job.status, to = %status, "illegal transition dropped");
            return Ok(());
        }
        job.error = error;
        self.results.freeze(job.id);
        job.results_count = self.results.count(job.id) as u32;
        self.monitor.job_finished(status).await;
        info!(
            job_id = %job.id,
            status = %status,
            results = job.results_count,
            error = job.error.as_deref().unwrap_or(""),
            "job finished"
        );
        for observer in &self.observers {
            let observer = observer.clone();
            let snapshot = job.clone();
            tokio::spawn(async move {
                observer.on_job_terminal(&snapshot).await;
            });
        }
        Ok(())
    }

    // ── maintenance ──────────────────────────────────────────────────────

    /// One maintenance pass: requeue or fail stalled tasks, fail inactive
    /// jobs, and enforce pending cancellations.
    ///
    /// In production this runs on the engine loop via
    /// [`Orchestrator::request_sweep`]; calling it directly is only safe
    /// when nothing else is writing.
    pub async fn run_sweep(&self) -> LeadScoutResult<SweepReport> {
        let mut report = SweepReport::default();

        for task in self.store.running_tasks().await? {
            if !task.is_stalled(self.config.task_timeout) {
                continue;
            }
            let mut task = task;
            if task.attempt_count < self.config.retry.max_attempts {
                task.status = TaskStatus::Pending;
                task.started_at = None;
                self.store.update_task(&task).await?;
                self.monitor.task_retried(task.stage()).await;
                self.queue
                    .push(Lane::for_stage(task.stage()), WorkItem::RunTask(task.id));
                warn!(
                    task_id = %task.id,
                    job_id = %task.job_id,
                    attempt = task.attempt_count,
                    "stalled task requeued"
                );
                report.tasks_requeued += 1;
            } else {
                task.status = TaskStatus::Failed;
                task.last_error = Some(format!(
                    "attempt did not finish within {:?}",
                    self.config.task_timeout
                ));
                task.finished_at = Some(Utc::now());
                self.store.update_task(&task).await?;
                self.monitor.task_failed(task.stage()).await;
                warn!(task_id = %task.id, job_id = %task.job_id, "stalled task failed, retry budget spent");
                report.tasks_failed += 1;
                if let Some(mut job) = self.store.get_job(task.job_id).await? {
                    if !job.status.is_terminal() {
                        job.stages.stage_mut(task.stage()).failed += 1;
                        job.touch();
                        self.check_barriers(&mut job).await?;
                        self.store.update_job(&job).await?;
                    }
                }
            }
        }

        for job in self.store.list_jobs(None, 0, usize::MAX).await? {
            if job.status.is_terminal() {
                continue;
            }
            let mut job = job;
            if job.cancel_requested {
                self.finalize(&mut job, JobStatus::Cancelled, Some(cancel_error()))
                    .await?;
                self.store.update_job(&job).await?;
                report.jobs_cancelled += 1;
            } else if job.is_stale(self.config.job_staleness_timeout) {
                let error = LeadScoutError::JobTimedOut(format!(
                    "no task activity within {:?}",
                    self.config.job_staleness_timeout
                ));
                self.finalize(&mut job, JobStatus::Failed, Some(error.to_string()))
                    .await?;
                self.store.update_job(&job).await?;
                report.jobs_failed += 1;
            }
        }

        Ok(report)
    }

    /// Delete terminal jobs older than `retention` along with their
    /// accumulated results. Returns the purged ids so the caller can
    /// clean up anything else keyed by job, such as export files.
    pub async fn purge_terminal_jobs(
        &self,
        retention: std::time::Duration,
    ) -> LeadScoutResult<Vec<Uuid>> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|_| LeadScoutError::Config("job retention out of range".into()))?;
        let cutoff = Utc::now() - retention;
        let mut purged = Vec::new();
        for id in self.store.terminal_jobs_before(cutoff).await? {
            if self.store.delete_job(id).await? {
                self.results.remove_job(id);
                purged.push(id);
            }
        }
        if !purged.is_empty() {
            info!(purged = purged.len(), "terminal jobs purged");
        }
        Ok(purged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use leadscout_store::MemoryJobStore;

    fn engine_with_config(config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(ResultStore::new()),
            Arc::new(AdapterRegistry::new()),
        )
    }

    fn engine() -> Orchestrator {
        engine_with_config(OrchestratorConfig::default())
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria::new("restaurants", "San Francisco, CA")
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 3_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&LeadScoutError::PlatformUnavailable(
            "upstream 503".into()
        )));
        assert!(is_retryable(&LeadScoutError::Store("lock poisoned".into())));
        assert!(!is_retryable(&LeadScoutError::PlatformUnavailable(
            "circuit breaker open for google_maps".into()
        )));
        assert!(!is_retryable(&LeadScoutError::PlatformUnavailable(
            "linkedin is not configured".into()
        )));
        assert!(!is_retryable(&LeadScoutError::Validation("bad".into())));
        assert!(!is_retryable(&LeadScoutError::NotFound("lead".into())));
    }

    #[tokio::test]
    async fn test_create_job_enforces_active_ceiling() {
        let engine = engine_with_config(OrchestratorConfig {
            max_active_jobs: 1,
            ..OrchestratorConfig::default()
        });
        engine.create_job(criteria()).await.unwrap();
        let err = engine.create_job(criteria()).await.unwrap_err();
        assert!(matches!(err, LeadScoutError::Overloaded(_)));
    }

    #[tokio::test]
    async fn test_create_job_rejects_invalid_criteria() {
        let engine = engine();
        let mut bad = criteria();
        bad.industry = String::new();
        let err = engine.create_job(bad).await.unwrap_err();
        assert!(matches!(err, LeadScoutError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_of_queued_job_finalizes_immediately() {
        let engine = engine();
        let job = engine.create_job(criteria()).await.unwrap();
        engine.apply_cancel(job.id).await.unwrap();

        let stored = engine.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.error.as_deref(), Some("Cancelled: by user request"));
    }

    #[tokio::test]
    async fn test_cancel_of_terminal_job_is_a_no_op() {
        let engine = engine();
        let job = engine.create_job(criteria()).await.unwrap();
        engine.apply_cancel(job.id).await.unwrap();

        let again = engine.cancel_job(job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_start_job_caps_tasks_and_splits_budget() {
        let engine = engine();
        let mut c = criteria();
        c.platforms = vec![Platform::GoogleMaps, Platform::Facebook, Platform::GoogleMaps];
        c.max_results = 25;
        let job = engine.create_job(c).await.unwrap();
        engine.start_job(job.id).await.unwrap();

        let stored = engine.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Discovering);
        // duplicate platform collapsed
        assert_eq!(stored.stages.discovery.dispatched, 2);

        let tasks = engine.store.tasks_for_job(job.id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            match task.payload {
                leadscout_core::TaskPayload::Discover { budget } => assert_eq!(budget, 13),
                _ => panic!("expected discovery payload"),
            }
        }
        assert_eq!(engine.queue.len(Lane::Discovery), 2);
    }

    #[tokio::test]
    async fn test_sweep_requeues_stalled_task() {
        let engine = engine_with_config(OrchestratorConfig {
            task_timeout: Duration::from_secs(10),
            ..OrchestratorConfig::default()
        });
        let job = engine.create_job(criteria()).await.unwrap();
        let mut task = TaskRecord::new_discovery(job.id, Platform::GoogleMaps, 10);
        task.status = TaskStatus::Running;
        task.attempt_count = 1;
        task.started_at = Some(Utc::now() - chrono::Duration::seconds(60));
        engine.store.insert_task(&task).await.unwrap();

        let report = engine.run_sweep().await.unwrap();
        assert_eq!(report.tasks_requeued, 1);
        let stored = engine.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(engine.queue.len(Lane::Discovery), 1);
    }

    #[tokio::test]
    async fn test_sweep_fails_stalled_task_out_of_budget_and_fails_job() {
        let engine = engine_with_config(OrchestratorConfig {
            task_timeout: Duration::from_secs(10),
            ..OrchestratorConfig::default()
        });
        let job = engine.create_job(criteria()).await.unwrap();
        engine.start_job(job.id).await.unwrap();

        // make the single dispatched task look stuck on its last attempt
        let tasks = engine.store.tasks_for_job(job.id).await.unwrap();
        let mut task = tasks[0].clone();
        task.status = TaskStatus::Running;
        task.attempt_count = engine.config.retry.max_attempts;
        task.started_at = Some(Utc::now() - chrono::Duration::seconds(60));
        engine.store.update_task(&task).await.unwrap();

        let report = engine.run_sweep().await.unwrap();
        assert_eq!(report.tasks_failed, 1);

        let stored = engine.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.last_error.as_deref().unwrap_or("").contains("did not finish"));

        // the only discovery task failed, so the barrier fails the job
        let job = engine.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or("").contains("all discovery tasks failed"));
    }

    #[tokio::test]
    async fn test_sweep_fails_stale_job() {
        let engine = engine_with_config(OrchestratorConfig {
            job_staleness_timeout: Duration::from_secs(30),
            ..OrchestratorConfig::default()
        });
        let job = engine.create_job(criteria()).await.unwrap();
        engine.start_job(job.id).await.unwrap();

        let mut stored = engine.get_job(job.id).await.unwrap();
        stored.updated_at = Utc::now() - chrono::Duration::seconds(120);
        engine.store.update_job(&stored).await.unwrap();

        let report = engine.run_sweep().await.unwrap();
        assert_eq!(report.jobs_failed, 1);
        let job = engine.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn test_sweep_enforces_pending_cancellation() {
        let engine = engine();
        let job = engine.create_job(criteria()).await.unwrap();
        engine.start_job(job.id).await.unwrap();

        let mut stored = engine.get_job(job.id).await.unwrap();
        stored.cancel_requested = true;
        engine.store.update_job(&stored).await.unwrap();

        let report = engine.run_sweep().await.unwrap();
        assert_eq!(report.jobs_cancelled, 1);
        assert_eq!(engine.get_job(job.id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_purge_removes_old_terminal_jobs_only() {
        let engine = engine();
        let keep = engine.create_job(criteria()).await.unwrap();

        let old = engine.create_job(criteria()).await.unwrap();
        engine.apply_cancel(old.id).await.unwrap();
        let mut old_record = engine.get_job(old.id).await.unwrap();
        old_record.completed_at = Some(Utc::now() - chrono::Duration::days(10));
        engine.store.update_job(&old_record).await.unwrap();

        let purged = engine
            .purge_terminal_jobs(Duration::from_secs(7 * 24 * 3600))
            .await
            .unwrap();
        assert_eq!(purged, vec![old.id]);
        assert!(engine.get_job(old.id).await.is_err());
        assert!(engine.get_job(keep.id).await.is_ok());
    }
}
