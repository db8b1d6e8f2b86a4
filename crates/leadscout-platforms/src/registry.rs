use crate::adapter::PlatformAdapter;
use crate::limits::{PlatformLimiter, PlatformLimits};
use leadscout_core::{
    AttributeSet, Candidate, LeadScoutError, LeadScoutResult, Platform, SearchCriteria,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Consecutive failures before a platform's breaker opens.
const TRIP_THRESHOLD: u32 = 5;

/// How long an open breaker blocks calls before admitting a probe.
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// Circuit breaker state for one platform.
///
/// Opens after a run of consecutive failures and fails calls fast until a
/// cooldown elapses; then a single probe is admitted and its outcome
/// decides whether the breaker closes again.
struct PlatformHealth {
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    trip_threshold: u32,
    cooldown: Duration,
}

impl PlatformHealth {
    fn new(trip_threshold: u32, cooldown: Duration) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            trip_threshold,
            cooldown,
        }
    }

    /// Whether a call may proceed right now.
    fn allow(&self) -> bool {
        if self.healthy.load(Ordering::Relaxed) {
            return true;
        }
        let mut opened = self.opened_at.lock();
        match *opened {
            Some(at) if at.elapsed() >= self.cooldown => {
                // Half-open: admit one probe, restart the window so
                // concurrent callers keep failing fast.
                *opened = Some(Instant::now());
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        *self.opened_at.lock() = None;
    }

    fn record_failure(&self) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.trip_threshold && self.healthy.swap(false, Ordering::Relaxed) {
            *self.opened_at.lock() = Some(Instant::now());
        }
        failures
    }

    fn is_open(&self) -> bool {
        !self.healthy.load(Ordering::Relaxed)
    }
}

/// Point-in-time breaker state for one platform, as reported by stats.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformHealthSnapshot {
    /// The platform.
    pub platform: Platform,
    /// False while the breaker is open.
    pub healthy: bool,
    /// Current run of consecutive failures.
    pub consecutive_failures: u32,
}

struct RegistryEntry {
    adapter: Arc<dyn PlatformAdapter>,
    limiter: PlatformLimiter,
    health: PlatformHealth,
}

/// The configured set of platform adapters, with per-platform guardrails.
///
/// Every adapter call goes through [`AdapterRegistry::discover`] or
/// [`AdapterRegistry::enrich`], which enforce in order: registration and
/// capability, circuit breaker, token bucket, concurrency permit, and the
/// per-call timeout. Workers never hold a reference to an adapter
/// directly.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: HashMap<Platform, RegistryEntry>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter with the given limits, replacing any previous
    /// adapter for the same platform.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>, limits: PlatformLimits) {
        let platform = adapter.descriptor().platform;
        debug!(platform = %platform, "registering platform adapter");
        self.entries.insert(
            platform,
            RegistryEntry {
                adapter,
                limiter: PlatformLimiter::new(limits),
                health: PlatformHealth::new(TRIP_THRESHOLD, BREAKER_COOLDOWN),
            },
        );
    }

    /// Whether an adapter is registered for `platform`.
    pub fn contains(&self, platform: Platform) -> bool {
        self.entries.contains_key(&platform)
    }

    /// All registered platforms, in stable order.
    pub fn platforms(&self) -> Vec<Platform> {
        let mut out: Vec<Platform> = self.entries.keys().copied().collect();
        out.sort();
        out
    }

    /// Registered platforms that support discovery, in stable order.
    pub fn discovery_platforms(&self) -> Vec<Platform> {
        let mut out: Vec<Platform> = self
            .entries
            .values()
            .filter(|e| e.adapter.descriptor().supports_discovery)
            .map(|e| e.adapter.descriptor().platform)
            .collect();
        out.sort();
        out
    }

    /// Registered platforms that support enrichment, in stable order.
    pub fn enrichment_platforms(&self) -> Vec<Platform> {
        let mut out: Vec<Platform> = self
            .entries
            .values()
            .filter(|e| e.adapter.descriptor().supports_enrichment)
            .map(|e| e.adapter.descriptor().platform)
            .collect();
        out.sort();
        out
    }

    /// Whether `platform` is registered and claims enrichment support.
    pub fn supports_enrichment(&self, platform: Platform) -> bool {
        self.entries
            .get(&platform)
            .is_some_and(|e| e.adapter.descriptor().supports_enrichment)
    }

    /// Breaker state for every registered platform, in stable order.
    pub fn health_snapshots(&self) -> Vec<PlatformHealthSnapshot> {
        let mut out: Vec<PlatformHealthSnapshot> = self
            .entries
            .iter()
            .map(|(platform, entry)| PlatformHealthSnapshot {
                platform: *platform,
                healthy: !entry.health.is_open(),
                consecutive_failures: entry.health.consecutive_failures.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by_key(|s| s.platform);
        out
    }

    fn entry(&self, platform: Platform) -> LeadScoutResult<&RegistryEntry> {
        self.entries.get(&platform).ok_or_else(|| {
            LeadScoutError::PlatformUnavailable(format!("{platform} is not configured"))
        })
    }

    fn check_breaker(&self, entry: &RegistryEntry, platform: Platform) -> LeadScoutResult<()> {
        if entry.health.allow() {
            Ok(())
        } else {
            Err(LeadScoutError::PlatformUnavailable(format!(
                "circuit breaker open for {platform}"
            )))
        }
    }

    /// Run a discovery call against `platform` under the guardrails.
    pub async fn discover(
        &self,
        platform: Platform,
        criteria: &SearchCriteria,
        limit: u32,
    ) -> LeadScoutResult<Vec<Candidate>> {
        let entry = self.entry(platform)?;
        if !entry.adapter.descriptor().supports_discovery {
            return Err(LeadScoutError::PlatformUnavailable(format!(
                "{platform} is not configured for discovery"
            )));
        }
        self.check_breaker(entry, platform)?;
        let _permit = entry.limiter.acquire().await?;
        let deadline = entry.limiter.timeout();
        let outcome = tokio::time::timeout(deadline, entry.adapter.discover(criteria, limit))
            .await
            .unwrap_or_else(|_| {
                Err(LeadScoutError::PlatformUnavailable(format!(
                    "{platform} discovery timed out after {deadline:?}"
                )))
            });
        self.settle(entry, platform, outcome)
    }

    /// Run an enrichment call against `platform` under the guardrails.
    pub async fn enrich(
        &self,
        platform: Platform,
        candidate: &Candidate,
    ) -> LeadScoutResult<AttributeSet> {
        let entry = self.entry(platform)?;
        if !entry.adapter.descriptor().supports_enrichment {
            return Err(LeadScoutError::PlatformUnavailable(format!(
                "{platform} is not configured for enrichment"
            )));
        }
        self.check_breaker(entry, platform)?;
        let _permit = entry.limiter.acquire().await?;
        let deadline = entry.limiter.timeout();
        let outcome = tokio::time::timeout(deadline, entry.adapter.enrich(candidate))
            .await
            .unwrap_or_else(|_| {
                Err(LeadScoutError::PlatformUnavailable(format!(
                    "{platform} enrichment timed out after {deadline:?}"
                )))
            });
        self.settle(entry, platform, outcome)
    }

    fn settle<T>(
        &self,
        entry: &RegistryEntry,
        platform: Platform,
        outcome: LeadScoutResult<T>,
    ) -> LeadScoutResult<T> {
        match outcome {
            Ok(value) => {
                entry.health.record_success();
                Ok(value)
            }
            Err(err) => {
                let failures = entry.health.record_failure();
                if entry.health.is_open() {
                    warn!(
                        platform = %platform,
                        consecutive_failures = failures,
                        "circuit breaker open"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedAdapter;

    fn failing_adapter(platform: Platform) -> Arc<ScriptedAdapter> {
        Arc::new(ScriptedAdapter::new(platform).with_discover(|_, _| {
            Err(LeadScoutError::PlatformUnavailable("upstream 503".into()))
        }))
    }

    #[tokio::test]
    async fn test_unregistered_platform_is_rejected() {
        let registry = AdapterRegistry::new();
        let err = registry
            .discover(Platform::GoogleMaps, &SearchCriteria::new("cafes", "Austin"), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_capability_mismatch_is_rejected() {
        let mut registry = AdapterRegistry::new();
        let enrich_only = Arc::new(
            ScriptedAdapter::new(Platform::Facebook)
                .with_enrich(|_| Ok(AttributeSet::new().with_field("phone", "555"))),
        );
        registry.register(enrich_only, PlatformLimits::unthrottled());
        let err = registry
            .discover(Platform::Facebook, &SearchCriteria::new("cafes", "Austin"), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured for discovery"));
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let mut registry = AdapterRegistry::new();
        let adapter = failing_adapter(Platform::GoogleMaps);
        registry.register(adapter.clone(), PlatformLimits::unthrottled());
        let criteria = SearchCriteria::new("cafes", "Austin");

        for _ in 0..TRIP_THRESHOLD {
            let _ = registry.discover(Platform::GoogleMaps, &criteria, 10).await;
        }
        assert_eq!(adapter.calls(), TRIP_THRESHOLD);

        // tripped: this call fails fast without reaching the adapter
        let err = registry
            .discover(Platform::GoogleMaps, &criteria, 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("circuit breaker open"));
        assert_eq!(adapter.calls(), TRIP_THRESHOLD);
    }

    #[tokio::test]
    async fn test_success_resets_failure_run() {
        let mut registry = AdapterRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let adapter = Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(
            move |_, _| {
                // fail on every odd call
                if counter.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
                    Err(LeadScoutError::PlatformUnavailable("upstream 503".into()))
                } else {
                    Ok(vec![Candidate::new("Atlas Cafes", "Austin")])
                }
            },
        ));
        registry.register(adapter, PlatformLimits::unthrottled());
        let criteria = SearchCriteria::new("cafes", "Austin");

        for _ in 0..(TRIP_THRESHOLD * 2) {
            let _ = registry.discover(Platform::GoogleMaps, &criteria, 10).await;
        }
        let snap = &registry.health_snapshots()[0];
        assert!(snap.healthy);
        assert!(snap.consecutive_failures <= 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let mut registry = AdapterRegistry::new();
        let slow = Arc::new(
            ScriptedAdapter::new(Platform::GoogleMaps)
                .with_delay(Duration::from_millis(200))
                .with_discover(|_, _| Ok(vec![])),
        );
        registry.register(
            slow,
            PlatformLimits {
                timeout: Duration::from_millis(20),
                ..PlatformLimits::unthrottled()
            },
        );
        let err = registry
            .discover(Platform::GoogleMaps, &SearchCriteria::new("cafes", "Austin"), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(registry.health_snapshots()[0].consecutive_failures, 1);
    }

    #[test]
    fn test_capability_listings_are_sorted() {
        let mut registry = AdapterRegistry::new();
        registry.register(
            Arc::new(ScriptedAdapter::new(Platform::Instagram).with_enrich(|_| Ok(AttributeSet::new()))),
            PlatformLimits::default(),
        );
        registry.register(
            Arc::new(ScriptedAdapter::new(Platform::GoogleMaps).with_discover(|_, _| Ok(vec![]))),
            PlatformLimits::default(),
        );
        assert_eq!(registry.platforms(), vec![Platform::GoogleMaps, Platform::Instagram]);
        assert_eq!(registry.discovery_platforms(), vec![Platform::GoogleMaps]);
        assert_eq!(registry.enrichment_platforms(), vec![Platform::Instagram]);
        assert!(registry.supports_enrichment(Platform::Instagram));
        assert!(!registry.supports_enrichment(Platform::GoogleMaps));
    }
}
