//! HTTP Job API for the LeadScout pipeline.
//!
//! The gateway exposes job submission, polling, cancellation, exports,
//! and pipeline stats over JSON, and delivers outbound webhook
//! notifications when jobs finish. Submission is rate-limited about ten
//! times more strictly than reads; API-key auth is optional and off
//! until keys are configured.

/// Request and response bodies.
pub mod dto;
/// Error-to-response mapping.
pub mod errors;
/// Auth and tiered rate-limit layers.
pub mod middleware;
/// Route handlers.
pub mod routes;
/// Router assembly and shared state.
pub mod server;
/// Outbound completion webhooks.
pub mod webhook;

pub use errors::{ApiError, ApiResult};
pub use middleware::{AuthConfig, RateLimits, RequestClass, TieredRateLimiter};
pub use server::{AppState, GatewayServer};
pub use webhook::WebhookNotifier;
