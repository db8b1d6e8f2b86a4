//! Periodic maintenance driver.
//!
//! The sweeper owns two clocks: a short interval that asks the engine for
//! a sweep (stalled tasks, stale jobs, pending cancellations), and a cron
//! schedule for the nightly purge of old terminal jobs and expired export
//! files. The sweep itself runs on the engine loop; this task only sends
//! the request, so it never races the single writer.

use crate::engine::Orchestrator;
use chrono::Utc;
use cron::Schedule;
use leadscout_core::{LeadScoutError, LeadScoutResult};
use leadscout_store::ExportStore;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Sweeper timing configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often the engine is asked for a maintenance sweep.
    pub interval: Duration,
    /// Cron expression (7-field, with seconds and year) for the purge run.
    pub purge_schedule: String,
    /// How long terminal jobs are kept before the purge deletes them.
    pub job_retention: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            // daily at midnight
            purge_schedule: "0 0 0 * * * *".to_string(),
            job_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Background maintenance task.
///
/// [`Sweeper::start`] consumes the sweeper and returns the task handle;
/// abort it to stop sweeping.
pub struct Sweeper {
    engine: Arc<Orchestrator>,
    exports: Option<Arc<ExportStore>>,
    config: SweepConfig,
}

impl Sweeper {
    /// Create a sweeper over the given engine.
    pub fn new(engine: Arc<Orchestrator>, config: SweepConfig) -> Self {
        Self {
            engine,
            exports: None,
            config,
        }
    }

    /// Also purge expired export files on the purge schedule.
    pub fn with_exports(mut self, exports: Arc<ExportStore>) -> Self {
        self.exports = Some(exports);
        self
    }

    fn parse_schedule(&self) -> LeadScoutResult<Schedule> {
        Schedule::from_str(&self.config.purge_schedule).map_err(|e| {
            LeadScoutError::Config(format!(
                "invalid purge schedule '{}': {e}",
                self.config.purge_schedule
            ))
        })
    }

    /// Spawn the sweep loop. Fails only on an unparseable purge schedule.
    pub fn start(self) -> LeadScoutResult<JoinHandle<()>> {
        let schedule = self.parse_schedule()?;
        info!(
            interval_secs = self.config.interval.as_secs(),
            schedule = %self.config.purge_schedule,
            "sweeper started"
        );
        let handle = tokio::spawn(async move {
            let mut next_purge = schedule.upcoming(Utc).next();
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.engine.request_sweep();
                if let Some(at) = next_purge {
                    if Utc::now() >= at {
                        self.run_purge().await;
                        next_purge = schedule.upcoming(Utc).next();
                        debug!(next = ?next_purge, "purge rescheduled");
                    }
                }
            }
        });
        Ok(handle)
    }

    async fn run_purge(&self) {
        match self
            .engine
            .purge_terminal_jobs(self.config.job_retention)
            .await
        {
            Ok(purged) => {
                if let Some(exports) = &self.exports {
                    for job_id in purged {
                        exports.remove_for_job(job_id).await;
                    }
                }
            }
            Err(err) => warn!(error = %err, "job purge failed"),
        }
        if let Some(exports) = &self.exports {
            let removed = exports.purge_expired().await;
            if removed > 0 {
                info!(removed, "expired exports purged");
            }
        }
    }
}
