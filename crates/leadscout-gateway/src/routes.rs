use crate::dto::{
    CreateExportRequest, ExportCreated, JobAccepted, JobList, JobView, ListJobsQuery, PageQuery,
    ResultsPage, StatsResponse,
};
use crate::errors::ApiResult;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use leadscout_core::{LeadScoutError, SearchCriteria};
use serde_json::json;
use uuid::Uuid;

/// `GET /health`.
pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "service": "leadscout"}))
}

/// `POST /api/v1/jobs`: validate, enqueue, return `202 Accepted`.
pub(crate) async fn create_job(
    State(state): State<AppState>,
    Json(criteria): Json<SearchCriteria>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let job = state.engine.create_job(criteria).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// `GET /api/v1/jobs`: newest first, optional status filter.
pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobList>> {
    let counts = state.engine.store().status_counts().await?;
    let total = match query.status {
        Some(status) => counts.get(&status).copied().unwrap_or(0),
        None => counts.values().sum(),
    };
    let jobs = state
        .engine
        .list_jobs(query.status, query.offset, query.limit)
        .await?
        .into_iter()
        .map(JobView::from)
        .collect();
    Ok(Json(JobList { total, jobs }))
}

/// `GET /api/v1/jobs/{id}`.
pub(crate) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    let job = state.engine.get_job(id).await?;
    Ok(Json(JobView::from(job)))
}

/// `GET /api/v1/jobs/{id}/results`: current leads, best first, paged.
pub(crate) async fn job_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ResultsPage>> {
    let leads = state.engine.job_results(id).await?;
    let total = leads.len();
    let results = leads
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();
    Ok(Json(ResultsPage {
        job_id: id,
        total,
        offset: page.offset,
        limit: page.limit,
        results,
    }))
}

/// `DELETE /api/v1/jobs/{id}`: request cancellation.
pub(crate) async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    let job = state.engine.cancel_job(id).await?;
    Ok(Json(JobView::from(job)))
}

/// `POST /api/v1/jobs/{id}/export`: snapshot a terminal job's leads to
/// a downloadable file.
pub(crate) async fn create_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CreateExportRequest>>,
) -> ApiResult<(StatusCode, Json<ExportCreated>)> {
    let exports = state
        .exports
        .as_ref()
        .ok_or_else(|| LeadScoutError::Config("exports are not enabled".into()))?;
    let job = state.engine.get_job(id).await?;
    if !job.status.is_terminal() {
        return Err(LeadScoutError::Validation(format!(
            "job {id} is still {}, exports need a terminal job",
            job.status
        ))
        .into());
    }
    let format = body.map(|Json(b)| b.format).unwrap_or_default();
    let leads = state.engine.results().leads(id);
    let record = exports.create(id, format, &leads).await?;
    Ok((
        StatusCode::CREATED,
        Json(ExportCreated {
            export_id: record.id,
            job_id: record.job_id,
            format: record.format,
            download_url: format!("/api/v1/exports/{}/download", record.id),
            expires_at: record.expires_at,
        }),
    ))
}

/// `GET /api/v1/exports/{id}/download`: serve the rendered file.
pub(crate) async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let exports = state
        .exports
        .as_ref()
        .ok_or_else(|| LeadScoutError::Config("exports are not enabled".into()))?;
    let (record, bytes) = exports.open(id).await?;
    let headers = [
        (
            header::CONTENT_TYPE,
            record.format.content_type().to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}.{}\"",
                record.id,
                record.format.extension()
            ),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// `GET /api/v1/stats`: store, pipeline, queue, and platform health.
pub(crate) async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let jobs = state.engine.store().status_counts().await?;
    let pipeline = state.engine.monitor().snapshot().await;
    let queues = state.engine.queue().depths();
    let platforms = state.engine.registry().health_snapshots();
    Ok(Json(StatsResponse {
        jobs,
        pipeline,
        queues,
        platforms,
    }))
}
