use crate::errors::json_error;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Auth configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// API keys that are allowed through. Empty means no auth required.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    /// Config over the given key set.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Whether authentication is enforced (at least one key configured).
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Which budget a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Job submission, the expensive path.
    Submit,
    /// Everything else: polling, listing, downloads.
    Read,
}

/// Classify a request by method and path.
///
/// Only `POST /api/v1/jobs` counts as a submission; exports and
/// cancellations are cheap and draw from the read budget.
pub fn classify(method: &Method, path: &str) -> RequestClass {
    if method == Method::POST && path == "/api/v1/jobs" {
        RequestClass::Submit
    } else {
        RequestClass::Read
    }
}

/// Token budgets per class. Submission defaults to roughly a tenth of the
/// read rate.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Burst size for submissions.
    pub submit_burst: f64,
    /// Sustained submissions per second.
    pub submit_per_second: f64,
    /// Burst size for reads.
    pub read_burst: f64,
    /// Sustained reads per second.
    pub read_per_second: f64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            submit_burst: 5.0,
            submit_per_second: 1.0,
            read_burst: 50.0,
            read_per_second: 10.0,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Two-tier token bucket limiter keyed by client.
///
/// The client key is the API key when one is presented, otherwise the
/// forwarded address, otherwise a shared anonymous bucket.
pub struct TieredRateLimiter {
    limits: RateLimits,
    submit: Mutex<HashMap<String, Bucket>>,
    read: Mutex<HashMap<String, Bucket>>,
}

impl TieredRateLimiter {
    /// A limiter with the given budgets.
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            submit: Mutex::new(HashMap::new()),
            read: Mutex::new(HashMap::new()),
        }
    }

    /// Budgets high enough to never block, for auth-only deployments.
    pub fn unlimited() -> Self {
        Self::new(RateLimits {
            submit_burst: 1e9,
            submit_per_second: 1e9,
            read_burst: 1e9,
            read_per_second: 1e9,
        })
    }

    /// Try to consume one token for `client` from the class budget.
    pub async fn check(&self, client: &str, class: RequestClass) -> bool {
        let (buckets, burst, rate) = match class {
            RequestClass::Submit => (
                &self.submit,
                self.limits.submit_burst,
                self.limits.submit_per_second,
            ),
            RequestClass::Read => (
                &self.read,
                self.limits.read_burst,
                self.limits.read_per_second,
            ),
        };
        let mut buckets = buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: burst,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle longer than `max_idle`.
    pub async fn cleanup(&self, max_idle: Duration) {
        let now = Instant::now();
        self.submit
            .lock()
            .await
            .retain(|_, b| now.duration_since(b.last_refill) < max_idle);
        self.read
            .lock()
            .await
            .retain(|_, b| now.duration_since(b.last_refill) < max_idle);
    }
}

/// Shared middleware state.
#[derive(Clone)]
pub struct MiddlewareState {
    /// The two-tier limiter.
    pub limiter: Arc<TieredRateLimiter>,
    /// The key set.
    pub auth: AuthConfig,
}

/// Query-string auth fallback.
#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    /// `?api_key=<key>`.
    pub api_key: Option<String>,
}

fn bearer_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

fn client_key(headers: &HeaderMap) -> String {
    if let Some(key) = bearer_key(headers) {
        return key;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Auth middleware: validates an API key from header or query param.
///
/// Checks `Authorization: Bearer <key>` first, then `?api_key=<key>`.
/// With no keys configured every request passes.
pub async fn auth_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }

    let key = bearer_key(&headers).or_else(|| query.api_key.clone());
    match key {
        Some(k) if state.auth.api_keys.contains(&k) => next.run(request).await,
        Some(_) => {
            warn!("rejected request: invalid API key");
            json_error(StatusCode::UNAUTHORIZED, "invalid_api_key", "invalid API key")
        }
        None => {
            warn!("rejected request: missing API key");
            json_error(StatusCode::UNAUTHORIZED, "missing_api_key", "API key required")
        }
    }
}

/// Rate-limit middleware over the two-tier token buckets.
pub async fn rate_limit_middleware(
    State(state): State<Arc<MiddlewareState>>,
    request: Request,
    next: Next,
) -> Response {
    let class = classify(request.method(), request.uri().path());
    let client = client_key(request.headers());
    if !state.limiter.check(&client, class).await {
        warn!(client = %client, ?class, "request rate limited");
        return json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "request rate limit exceeded",
        );
    }
    next.run(request).await
}
