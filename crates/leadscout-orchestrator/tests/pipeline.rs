//! End-to-end pipeline scenarios over scripted adapters.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use leadscout_core::{
    Candidate, Intensity, JobRecord, JobStatus, LeadScoutError, Platform, SearchCriteria, Stage,
    TaskStatus,
};
use leadscout_orchestrator::{JobObserver, Orchestrator, OrchestratorConfig, OrchestratorHandle};
use leadscout_platforms::{AdapterRegistry, PlatformLimits, ScriptedAdapter};
use leadscout_store::{MemoryJobStore, ResultStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.retry.backoff_base_ms = 10;
    config.retry.backoff_max_ms = 50;
    config
}

fn start_pipeline(
    registry: AdapterRegistry,
    config: OrchestratorConfig,
) -> (Arc<Orchestrator>, OrchestratorHandle) {
    let engine = Arc::new(Orchestrator::new(
        config,
        Arc::new(MemoryJobStore::new()),
        Arc::new(ResultStore::new()),
        Arc::new(registry),
    ));
    let handle = engine.start().expect("pipeline starts once");
    (engine, handle)
}

fn shops(range: std::ops::Range<usize>) -> Vec<Candidate> {
    range
        .map(|i| {
            Candidate::new(format!("Shop {i}"), "Springfield, IL")
                .with_field("address", format!("{i} Elm St"))
        })
        .collect()
}

async fn wait_terminal(engine: &Arc<Orchestrator>, id: Uuid) -> JobRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = engine.get_job(id).await.expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job stuck in {:?}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_standard_job_discovers_then_enriches() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(shops(0..3))),
        ),
        PlatformLimits::unthrottled(),
    );
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::Facebook)
                .with_discover(|_, _| Ok(shops(2..4)))
                .with_delay(Duration::from_millis(100)),
        ),
        PlatformLimits::unthrottled(),
    );
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleBusiness).with_enrich(|_| {
            Ok(leadscout_core::AttributeSet::new()
                .with_field("phone", "+1 555 0100")
                .with_field("hours", "Mon-Fri 9:00-17:00"))
        })),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria = SearchCriteria::new("coffee", "Springfield, IL")
        .with_platforms(vec![Platform::GoogleMaps, Platform::Facebook]);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    // Shop 2 overlaps, so five candidates deduplicate to four leads
    assert_eq!(job.results_count, 4);
    assert_eq!(job.stages.discovery.dispatched, 2);
    assert_eq!(job.stages.discovery.succeeded, 2);
    assert_eq!(job.stages.enrichment.dispatched, 4);
    assert_eq!(job.stages.enrichment.succeeded, 4);

    let leads = engine.job_results(job.id).await.unwrap();
    assert_eq!(leads.len(), 4);
    for lead in &leads {
        let phone = lead.fields.get("phone").expect("enriched phone");
        assert_eq!(phone.source, Platform::GoogleBusiness);
        assert!(lead.provenance.contains(&Platform::GoogleBusiness));
    }
    let merged = leads
        .iter()
        .find(|l| l.business_name == "Shop 2")
        .expect("overlapping lead");
    assert!(merged.provenance.contains(&Platform::GoogleMaps));
    assert!(merged.provenance.contains(&Platform::Facebook));

    // enrichment must not start before the last discovery task finished
    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    let discovery_done = tasks
        .iter()
        .filter(|t| t.stage() == Stage::Discovery)
        .filter_map(|t| t.finished_at)
        .max()
        .unwrap();
    let enrichment_started = tasks
        .iter()
        .filter(|t| t.stage() == Stage::Enrichment)
        .filter_map(|t| t.started_at)
        .min()
        .unwrap();
    assert!(discovery_done <= enrichment_started);

    let snapshot = engine.monitor().snapshot().await;
    assert_eq!(snapshot.jobs_created, 1);
    assert_eq!(snapshot.jobs_completed, 1);
    assert_eq!(snapshot.discovery.succeeded, 2);
    assert_eq!(snapshot.enrichment.succeeded, 4);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_basic_job_skips_enrichment() {
    let enricher = Arc::new(ScriptedAdapter::new(Platform::GoogleBusiness).with_enrich(|_| {
        Ok(leadscout_core::AttributeSet::new().with_field("phone", "+1 555 0100"))
    }));
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(shops(0..3))),
        ),
        PlatformLimits::unthrottled(),
    );
    registry.register(enricher.clone(), PlatformLimits::unthrottled());

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria =
        SearchCriteria::new("coffee", "Springfield, IL").with_intensity(Intensity::Basic);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results_count, 3);
    assert_eq!(job.stages.enrichment.dispatched, 0);
    assert_eq!(enricher.calls(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_zero_candidates_completes_empty() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(Vec::new()))),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria =
        SearchCriteria::new("submarine shipyards", "Springfield, IL").with_intensity(Intensity::Basic);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    // an empty market is a successful answer, not a failure
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results_count, 0);
    assert!(job.error.is_none());
    assert!(engine.job_results(job.id).await.unwrap().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_standard_zero_candidates_skips_enrichment() {
    let enricher = Arc::new(ScriptedAdapter::new(Platform::GoogleBusiness).with_enrich(|_| {
        Ok(leadscout_core::AttributeSet::new().with_field("phone", "+1 555 0100"))
    }));
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(Vec::new()))),
        PlatformLimits::unthrottled(),
    );
    registry.register(enricher.clone(), PlatformLimits::unthrottled());

    let (engine, handle) = start_pipeline(registry, fast_config());
    let job = engine
        .create_job(SearchCriteria::new("submarine shipyards", "Springfield, IL"))
        .await
        .unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stages.discovery.succeeded, 1);
    assert_eq!(job.stages.enrichment.dispatched, 0);
    assert_eq!(enricher.calls(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_standard_with_no_complementary_platforms_completes_without_enrichment() {
    let mut registry = AdapterRegistry::new();
    for platform in [Platform::GoogleMaps, Platform::Facebook] {
        registry.register(
            Arc::new(
                ScriptedAdapter::new(platform)
                    .with_discover(|_, _| Ok(shops(0..2)))
                    .with_enrich(|_| Ok(leadscout_core::AttributeSet::new())),
            ),
            PlatformLimits::unthrottled(),
        );
    }

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria = SearchCriteria::new("coffee", "Springfield, IL")
        .with_platforms(vec![Platform::GoogleMaps, Platform::Facebook]);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    // every enrichment-capable platform was already searched
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stages.enrichment.dispatched, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_transient_failures_retry_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(move |_, _| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LeadScoutError::PlatformUnavailable("upstream 503".into()))
                } else {
                    Ok(shops(0..2))
                }
            }),
        ),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria =
        SearchCriteria::new("coffee", "Springfield, IL").with_intensity(Intensity::Basic);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results_count, 2);

    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(tasks[0].attempt_count, 3);

    let snapshot = engine.monitor().snapshot().await;
    assert_eq!(snapshot.discovery.retried, 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_job_fails_when_every_discovery_platform_fails() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| {
            Err(LeadScoutError::PlatformUnavailable("upstream 503".into()))
        })),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let job = engine
        .create_job(SearchCriteria::new("coffee", "Springfield, IL"))
        .await
        .unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.as_deref().unwrap_or("");
    assert!(error.contains("all discovery tasks failed"), "{error}");
    assert!(error.contains("upstream 503"), "{error}");
    assert_eq!(job.results_count, 0);

    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    assert_eq!(tasks[0].attempt_count, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_unregistered_platform_fails_fast_without_retries() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(shops(0..2))),
        ),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria = SearchCriteria::new("coffee", "Springfield, IL")
        .with_intensity(Intensity::Basic)
        .with_platforms(vec![Platform::GoogleMaps, Platform::Linkedin]);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    // the healthy platform carries the job to completion
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stages.discovery.succeeded, 1);
    assert_eq!(job.stages.discovery.failed, 1);

    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    let linkedin = tasks
        .iter()
        .find(|t| t.platform == Platform::Linkedin)
        .unwrap();
    assert_eq!(linkedin.status, TaskStatus::Failed);
    assert_eq!(linkedin.attempt_count, 1);
    assert!(linkedin
        .last_error
        .as_deref()
        .unwrap_or("")
        .contains("not configured"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_open_breaker_fails_job_without_retries() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| {
            Err(LeadScoutError::PlatformUnavailable("upstream 503".into()))
        })),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());

    // trip the breaker before any job runs
    let probe = SearchCriteria::new("coffee", "Springfield, IL");
    for _ in 0..5 {
        let _ = engine
            .registry()
            .discover(Platform::GoogleMaps, &probe, 5)
            .await;
    }

    let job = engine.create_job(probe).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    assert_eq!(tasks[0].attempt_count, 1);
    assert!(tasks[0]
        .last_error
        .as_deref()
        .unwrap_or("")
        .contains("circuit breaker open"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_cancel_during_discovery_skips_remaining_work() {
    let enricher = Arc::new(ScriptedAdapter::new(Platform::GoogleBusiness).with_enrich(|_| {
        Ok(leadscout_core::AttributeSet::new().with_field("phone", "+1 555 0100"))
    }));
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps)
                .with_discover(|_, _| Ok(shops(0..3)))
                .with_delay(Duration::from_millis(300)),
        ),
        PlatformLimits::unthrottled(),
    );
    registry.register(enricher.clone(), PlatformLimits::unthrottled());

    let (engine, handle) = start_pipeline(registry, fast_config());
    let job = engine
        .create_job(SearchCriteria::new("coffee", "Springfield, IL"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancelling = engine.cancel_job(job.id).await.unwrap();
    assert!(cancelling.cancel_requested);

    let job = wait_terminal(&engine, job.id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.error.as_deref(), Some("Cancelled: by user request"));
    // no enrichment was dispatched and the enricher never ran
    assert_eq!(job.stages.enrichment.dispatched, 0);
    assert_eq!(enricher.calls(), 0);

    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Skipped);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_discoveries_merge_and_outscore_singletons() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| {
            Ok(vec![
                Candidate::new("Atlas Cafe", "Portland, OR").with_field("address", "12 Oak Ave"),
                Candidate::new("Harbor Cafe", "Portland, OR").with_field("address", "9 Bay Rd"),
            ])
        })),
        PlatformLimits::unthrottled(),
    );
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::Facebook).with_discover(|_, _| {
            Ok(vec![
                Candidate::new("Atlas Cafe", "Portland, OR")
                    .with_field("website", "https://atlas.example.com"),
                Candidate::new("Beacon Cafe", "Portland, OR")
                    .with_field("website", "https://beacon.example.com"),
            ])
        })),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria = SearchCriteria::new("cafes", "Portland, OR")
        .with_intensity(Intensity::Basic)
        .with_platforms(vec![Platform::GoogleMaps, Platform::Facebook]);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results_count, 3);

    let leads = engine.job_results(job.id).await.unwrap();
    // the two-platform lead carries both fields and sorts first
    assert_eq!(leads[0].business_name, "Atlas Cafe");
    assert_eq!(leads[0].provenance.len(), 2);
    assert!(leads[0].fields.contains_key("address"));
    assert!(leads[0].fields.contains_key("website"));
    assert!(leads[0].confidence_score > leads[1].confidence_score);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_premium_verifies_agreeing_fields_across_sources() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| {
            Ok(vec![Candidate::new("Atlas Cafe", "Portland, OR")
                .with_field("website", "https://atlas.example.com")])
        })),
        PlatformLimits::unthrottled(),
    );
    registry.register(
        Arc::new(ScriptedAdapter::new(Platform::Facebook).with_enrich(|_| {
            Ok(leadscout_core::AttributeSet::new()
                .with_field("website", "https://atlas.example.com")
                .with_field("email", "hello@atlas.example.com"))
        })),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria =
        SearchCriteria::new("cafes", "Portland, OR").with_intensity(Intensity::Premium);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let leads = engine.job_results(job.id).await.unwrap();
    assert_eq!(leads.len(), 1);
    let website = leads[0].fields.get("website").unwrap();
    // same value reported by a second platform marks the field verified
    assert!(website.verified);
    assert_eq!(website.source, Platform::GoogleMaps);
    assert!(leads[0].fields.contains_key("email"));
    assert!(leads[0].provenance.contains(&Platform::Facebook));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_result_cap_discards_overflow() {
    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(shops(0..8))),
        ),
        PlatformLimits::unthrottled(),
    );

    let (engine, handle) = start_pipeline(registry, fast_config());
    let criteria = SearchCriteria::new("coffee", "Springfield, IL")
        .with_intensity(Intensity::Basic)
        .with_max_results(3);
    let job = engine.create_job(criteria).await.unwrap();
    let job = wait_terminal(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results_count, 3);
    let tasks = engine.store().tasks_for_job(job.id).await.unwrap();
    assert_eq!(tasks[0].produced, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_observer_hears_terminal_jobs() {
    struct Recorder(tokio::sync::mpsc::UnboundedSender<(Uuid, JobStatus)>);

    #[async_trait::async_trait]
    impl JobObserver for Recorder {
        async fn on_job_terminal(&self, job: &JobRecord) {
            let _ = self.0.send((job.id, job.status));
        }
    }

    let mut registry = AdapterRegistry::new();
    registry.register(
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(shops(0..2))),
        ),
        PlatformLimits::unthrottled(),
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(
        Orchestrator::new(
            fast_config(),
            Arc::new(MemoryJobStore::new()),
            Arc::new(ResultStore::new()),
            Arc::new(registry),
        )
        .with_observer(Arc::new(Recorder(tx))),
    );
    let handle = engine.start().expect("pipeline starts once");

    let criteria =
        SearchCriteria::new("coffee", "Springfield, IL").with_intensity(Intensity::Basic);
    let job = engine.create_job(criteria).await.unwrap();
    wait_terminal(&engine, job.id).await;

    let (seen_id, seen_status) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("observer notified")
        .expect("channel open");
    assert_eq!(seen_id, job.id);
    assert_eq!(seen_status, JobStatus::Completed);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_second_start_is_refused() {
    let (engine, handle) = start_pipeline(AdapterRegistry::new(), fast_config());
    assert!(engine.start().is_err());
    handle.shutdown().await;
}
