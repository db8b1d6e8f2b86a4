//! Platform adapter layer.
//!
//! Everything the pipeline knows about an external data source goes through
//! the [`PlatformAdapter`] trait. The [`AdapterRegistry`] owns the configured
//! adapters and wraps every call with the per-platform guardrails: a token
//! bucket and concurrency ceiling ([`PlatformLimiter`]) plus a circuit
//! breaker that fails fast while a platform is degraded.
//!
//! [`ScriptedAdapter`] is the in-process implementation used by the demo
//! wiring and the integration tests; real API-backed adapters implement the
//! same trait.

/// The [`PlatformAdapter`] trait and its descriptor.
pub mod adapter;
/// Token-bucket rate limiting and concurrency ceilings.
pub mod limits;
/// Adapter registry with per-platform guardrails.
pub mod registry;
/// Scripted in-process adapters for demos and tests.
pub mod scripted;

pub use adapter::{AdapterDescriptor, PlatformAdapter};
pub use limits::{PlatformLimiter, PlatformLimits};
pub use registry::{AdapterRegistry, PlatformHealthSnapshot};
pub use scripted::{demo_catalog, ScriptedAdapter};
