use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadscout_core::{JobRecord, JobStatus};
use leadscout_orchestrator::JobObserver;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    job_id: Uuid,
    status: JobStatus,
    results_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

/// Posts a completion notice to the job's webhook URL once it settles.
///
/// Delivery is fire-and-forget: a rejected or unreachable endpoint is
/// logged and dropped, it never affects the job itself.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// A notifier with a 10 second delivery timeout.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobObserver for WebhookNotifier {
    async fn on_job_terminal(&self, job: &JobRecord) {
        let Some(url) = job.criteria.webhook_url.as_deref() else {
            return;
        };
        let payload = WebhookPayload {
            job_id: job.id,
            status: job.status,
            results_count: job.results_count,
            error: job.error.as_deref(),
            completed_at: job.completed_at,
        };
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(job_id = %job.id, status = %job.status, "webhook delivered");
            }
            Ok(resp) => {
                warn!(
                    job_id = %job.id,
                    status = %resp.status(),
                    "webhook rejected"
                );
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "webhook delivery failed");
            }
        }
    }
}
