use crate::middleware::{
    auth_middleware, rate_limit_middleware, AuthConfig, MiddlewareState, TieredRateLimiter,
};
use crate::routes;
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use leadscout_orchestrator::Orchestrator;
use leadscout_store::ExportStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The job engine.
    pub engine: Arc<Orchestrator>,
    /// Export snapshots, absent when exports are disabled.
    pub exports: Option<Arc<ExportStore>>,
}

/// The job API server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the API without auth or rate limiting.
    pub fn build(engine: Arc<Orchestrator>, exports: Option<Arc<ExportStore>>) -> Router {
        Self::build_with_middleware(engine, exports, None, AuthConfig::new(vec![]))
    }

    /// Build the API with optional rate limiting and auth middleware.
    pub fn build_with_middleware(
        engine: Arc<Orchestrator>,
        exports: Option<Arc<ExportStore>>,
        rate_limiter: Option<Arc<TieredRateLimiter>>,
        auth_config: AuthConfig,
    ) -> Router {
        let state = AppState { engine, exports };

        let app = Router::new()
            .route("/health", get(routes::health))
            .route(
                "/api/v1/jobs",
                post(routes::create_job).get(routes::list_jobs),
            )
            .route(
                "/api/v1/jobs/{id}",
                get(routes::get_job).delete(routes::cancel_job),
            )
            .route("/api/v1/jobs/{id}/results", get(routes::job_results))
            .route("/api/v1/jobs/{id}/export", post(routes::create_export))
            .route("/api/v1/exports/{id}/download", get(routes::download_export))
            .route("/api/v1/stats", get(routes::stats))
            .with_state(state);

        // Apply middleware if configured
        if rate_limiter.is_some() || auth_config.is_enabled() {
            let mw_state = Arc::new(MiddlewareState {
                limiter: rate_limiter
                    .unwrap_or_else(|| Arc::new(TieredRateLimiter::unlimited())),
                auth: auth_config,
            });

            app.layer(axum_mw::from_fn_with_state(
                mw_state.clone(),
                rate_limit_middleware,
            ))
            .layer(axum_mw::from_fn_with_state(mw_state, auth_middleware))
        } else {
            app
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use leadscout_orchestrator::OrchestratorConfig;
    use leadscout_platforms::AdapterRegistry;
    use leadscout_store::{MemoryJobStore, ResultStore};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let engine = Arc::new(Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(MemoryJobStore::new()),
            Arc::new(ResultStore::new()),
            Arc::new(AdapterRegistry::new()),
        ));
        GatewayServer::build(engine, None)
    }

    #[tokio::test]
    async fn test_health_route() {
        let resp = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "leadscout");
    }

    #[tokio::test]
    async fn test_unrouted_path_is_404() {
        let resp = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_without_store_is_a_config_error() {
        let resp = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/jobs/{}/export", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "internal_error");
    }
}
