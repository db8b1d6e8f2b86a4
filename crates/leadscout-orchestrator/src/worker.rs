//! Worker pools for the discovery and enrichment lanes.
//!
//! A worker claims a pending task, calls the platform adapter through the
//! registry guards, writes the output into the result store, and reports
//! back to the engine loop with events. It never touches job or task
//! records itself.

use crate::engine::{EngineEvent, Orchestrator, TaskOutcome};
use crate::queue::{Lane, WorkItem};
use leadscout_core::{
    Intensity, JobRecord, LeadScoutError, TaskPayload, TaskRecord, TaskStatus,
};
use leadscout_store::MergeOutcome;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Spawn `count` workers consuming one lane until shutdown.
pub(crate) fn spawn_workers(
    engine: Arc<Orchestrator>,
    lane: Lane,
    count: usize,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|index| {
            let engine = engine.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                debug!(%lane, index, "worker started");
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        item = engine.queue().pull(lane) => {
                            match item {
                                WorkItem::RunTask(task_id) => run_item(&engine, lane, task_id).await,
                                WorkItem::StartJob(job_id) => {
                                    warn!(%lane, job_id = %job_id, "job item on a task lane dropped");
                                }
                            }
                        }
                    }
                }
                debug!(%lane, index, "worker stopped");
            })
        })
        .collect()
}

/// Claim one queued task and run it to an outcome event.
///
/// The attempt number is fixed at claim time; the engine loop rejects any
/// event carrying a number that no longer matches the record, so a worker
/// that lost its claim to the sweep cannot corrupt state.
async fn run_item(engine: &Arc<Orchestrator>, lane: Lane, task_id: Uuid) {
    let task = match engine.store().get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(%lane, task_id = %task_id, "queued task no longer exists");
            return;
        }
        Err(err) => {
            warn!(%lane, task_id = %task_id, error = %err, "task load failed");
            return;
        }
    };
    if task.status != TaskStatus::Pending {
        debug!(task_id = %task.id, status = %task.status, "claim on a settled task dropped");
        return;
    }
    let job = match engine.store().get_job(task.job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(task_id = %task.id, job_id = %task.job_id, "task for unknown job dropped");
            return;
        }
        Err(err) => {
            warn!(task_id = %task.id, error = %err, "job load failed");
            return;
        }
    };

    let attempt = task.attempt_count + 1;
    if job.status.is_terminal() || job.cancel_requested {
        engine.emit(EngineEvent::TaskCompleted {
            task_id: task.id,
            job_id: job.id,
            attempt,
            outcome: TaskOutcome::Skipped,
        });
        return;
    }

    engine.emit(EngineEvent::TaskStarted {
        task_id: task.id,
        job_id: job.id,
        attempt,
    });
    let outcome = execute(engine, &task, &job).await;
    engine.emit(EngineEvent::TaskCompleted {
        task_id: task.id,
        job_id: job.id,
        attempt,
        outcome,
    });
}

async fn execute(engine: &Arc<Orchestrator>, task: &TaskRecord, job: &JobRecord) -> TaskOutcome {
    match &task.payload {
        TaskPayload::Discover { budget } => discover(engine, task, job, *budget).await,
        TaskPayload::Enrich { identity_key } => enrich(engine, task, job, identity_key).await,
    }
}

/// Run one discovery call and feed its candidates into the result store.
///
/// `produced` counts candidates that inserted a new lead or merged into an
/// existing one; candidates discarded at the result cap do not count.
async fn discover(
    engine: &Arc<Orchestrator>,
    task: &TaskRecord,
    job: &JobRecord,
    budget: u32,
) -> TaskOutcome {
    let candidates = match engine
        .registry()
        .discover(task.platform, &job.criteria, budget)
        .await
    {
        Ok(candidates) => candidates,
        Err(error) => return TaskOutcome::Failure { error },
    };
    // the job may have been cancelled or timed out during the call
    if !job_is_active(engine, job.id).await {
        return TaskOutcome::Skipped;
    }
    let outcomes = engine
        .results()
        .insert_candidates(job.id, task.platform, candidates);
    let produced = outcomes
        .iter()
        .filter(|o| !matches!(o, MergeOutcome::Discarded))
        .count() as u32;
    TaskOutcome::Success { produced }
}

/// Run one enrichment call against a single lead and merge the returned
/// attributes. `produced` is the number of fields that actually changed.
async fn enrich(
    engine: &Arc<Orchestrator>,
    task: &TaskRecord,
    job: &JobRecord,
    identity_key: &str,
) -> TaskOutcome {
    let Some(lead) = engine.results().lead(job.id, identity_key) else {
        // the lead can only disappear if the job's results were purged
        return TaskOutcome::Failure {
            error: LeadScoutError::NotFound(format!("lead {identity_key}")),
        };
    };
    let candidate = lead.as_candidate();
    let attrs = match engine.registry().enrich(task.platform, &candidate).await {
        Ok(attrs) => attrs,
        Err(error) => return TaskOutcome::Failure { error },
    };
    if !job_is_active(engine, job.id).await {
        return TaskOutcome::Skipped;
    }
    let verify = job.criteria.intensity == Intensity::Premium;
    let changed = engine
        .results()
        .merge_attributes(job.id, identity_key, task.platform, attrs, verify);
    TaskOutcome::Success {
        produced: changed as u32,
    }
}

async fn job_is_active(engine: &Arc<Orchestrator>, job_id: Uuid) -> bool {
    match engine.store().get_job(job_id).await {
        Ok(Some(job)) => !job.status.is_terminal() && !job.cancel_requested,
        _ => false,
    }
}
