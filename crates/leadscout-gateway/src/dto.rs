use chrono::{DateTime, Utc};
use leadscout_core::{Intensity, JobRecord, JobStatus, Lead, StageCounters};
use leadscout_orchestrator::{MonitorSnapshot, QueueDepths};
use leadscout_platforms::PlatformHealthSnapshot;
use leadscout_store::ExportFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn default_limit() -> usize {
    50
}

/// Paging bounds for result listings.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Items to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size, defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Query string of `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Restrict to one status.
    pub status: Option<JobStatus>,
    /// Items to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size, defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Body of `POST /api/v1/jobs/{id}/export`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateExportRequest {
    /// Rendered format, defaults to CSV.
    #[serde(default)]
    pub format: ExportFormat,
}

/// `202 Accepted` body for a submitted job.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    /// The new job's id, used for all later polling.
    pub job_id: Uuid,
    /// Status at acceptance time, always `queued`.
    pub status: JobStatus,
}

/// One job as the API presents it.
#[derive(Debug, Serialize)]
pub struct JobView {
    /// Job identifier.
    pub job_id: Uuid,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Requested industry.
    pub industry: String,
    /// Requested location.
    pub location: String,
    /// Requested search depth.
    pub intensity: Intensity,
    /// Per-stage dispatch and settlement counters.
    pub stages: StageCounters,
    /// Leads accumulated so far (final once terminal).
    pub results_count: u32,
    /// Whether cancellation has been requested.
    pub cancel_requested: bool,
    /// Terminal error, when the job failed or was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last engine activity.
    pub updated_at: DateTime<Utc>,
    /// When discovery began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            industry: job.criteria.industry,
            location: job.criteria.location,
            intensity: job.criteria.intensity,
            stages: job.stages,
            results_count: job.results_count,
            cancel_requested: job.cancel_requested,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Body of `GET /api/v1/jobs`.
#[derive(Debug, Serialize)]
pub struct JobList {
    /// Jobs matching the filter, before paging.
    pub total: usize,
    /// The requested page.
    pub jobs: Vec<JobView>,
}

/// Body of `GET /api/v1/jobs/{id}/results`.
#[derive(Debug, Serialize)]
pub struct ResultsPage {
    /// The job the leads belong to.
    pub job_id: Uuid,
    /// Leads accumulated so far, before paging.
    pub total: usize,
    /// Echo of the requested offset.
    pub offset: usize,
    /// Echo of the requested limit.
    pub limit: usize,
    /// The requested page, best leads first.
    pub results: Vec<Lead>,
}

/// Body of `POST /api/v1/jobs/{id}/export`.
#[derive(Debug, Serialize)]
pub struct ExportCreated {
    /// The snapshot's id.
    pub export_id: Uuid,
    /// The job it was rendered from.
    pub job_id: Uuid,
    /// Rendered format.
    pub format: ExportFormat,
    /// Relative URL serving the file until expiry.
    pub download_url: String,
    /// When the file becomes eligible for deletion.
    pub expires_at: DateTime<Utc>,
}

/// Body of `GET /api/v1/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Stored jobs by status.
    pub jobs: HashMap<JobStatus, usize>,
    /// Task and job counters since startup.
    pub pipeline: MonitorSnapshot,
    /// Current queue depth per lane.
    pub queues: QueueDepths,
    /// Circuit breaker state per registered platform.
    pub platforms: Vec<PlatformHealthSnapshot>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use leadscout_core::SearchCriteria;

    #[test]
    fn test_job_view_from_record() {
        let job = JobRecord::new(SearchCriteria::new("plumbers", "Denver, CO"));
        let view = JobView::from(job.clone());
        assert_eq!(view.job_id, job.id);
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.industry, "plumbers");
        assert!(view.error.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "queued");
        // absent optionals are omitted, not null
        assert!(json.get("completed_at").is_none());
    }

    #[test]
    fn test_list_query_defaults() {
        let q: ListJobsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.offset, 0);
        assert_eq!(q.limit, 50);
        assert!(q.status.is_none());

        let q: ListJobsQuery =
            serde_json::from_str(r#"{"status": "completed", "limit": 5}"#).unwrap();
        assert_eq!(q.status, Some(JobStatus::Completed));
        assert_eq!(q.limit, 5);
    }

    #[test]
    fn test_export_request_defaults_to_csv() {
        let r: CreateExportRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(r.format, ExportFormat::Csv);
        let r: CreateExportRequest = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(r.format, ExportFormat::Json);
    }
}
