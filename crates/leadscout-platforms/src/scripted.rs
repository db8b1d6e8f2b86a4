use crate::adapter::{AdapterDescriptor, PlatformAdapter};
use async_trait::async_trait;
use leadscout_core::{
    AttributeSet, Candidate, LeadScoutError, LeadScoutResult, Platform, SearchCriteria,
};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

type DiscoverFn =
    dyn Fn(&SearchCriteria, u32) -> LeadScoutResult<Vec<Candidate>> + Send + Sync + 'static;
type EnrichFn = dyn Fn(&Candidate) -> LeadScoutResult<AttributeSet> + Send + Sync + 'static;

/// An in-process adapter driven by closures.
///
/// Capabilities follow from which scripts are installed: an adapter with
/// only a discover script advertises discovery only. The optional delay is
/// applied before the script runs, which makes timeout and concurrency
/// behavior observable in tests. `calls()` counts invocations that reached
/// the adapter, so tests can assert that guardrails short-circuited.
pub struct ScriptedAdapter {
    platform: Platform,
    discover_fn: Option<Arc<DiscoverFn>>,
    enrich_fn: Option<Arc<EnrichFn>>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    /// An adapter for `platform` with no capabilities yet.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            discover_fn: None,
            enrich_fn: None,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Install a discovery script.
    pub fn with_discover(
        mut self,
        f: impl Fn(&SearchCriteria, u32) -> LeadScoutResult<Vec<Candidate>> + Send + Sync + 'static,
    ) -> Self {
        self.discover_fn = Some(Arc::new(f));
        self
    }

    /// Install an enrichment script.
    pub fn with_enrich(
        mut self,
        f: impl Fn(&Candidate) -> LeadScoutResult<AttributeSet> + Send + Sync + 'static,
    ) -> Self {
        self.enrich_fn = Some(Arc::new(f));
        self
    }

    /// Sleep for `delay` before each scripted call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls that reached this adapter.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            platform: self.platform,
            supports_discovery: self.discover_fn.is_some(),
            supports_enrichment: self.enrich_fn.is_some(),
        }
    }

    async fn discover(
        &self,
        criteria: &SearchCriteria,
        limit: u32,
    ) -> LeadScoutResult<Vec<Candidate>> {
        self.enter().await;
        match &self.discover_fn {
            Some(f) => f(criteria, limit),
            None => Err(LeadScoutError::PlatformUnavailable(format!(
                "{} is not configured for discovery",
                self.platform
            ))),
        }
    }

    async fn enrich(&self, candidate: &Candidate) -> LeadScoutResult<AttributeSet> {
        self.enter().await;
        match &self.enrich_fn {
            Some(f) => f(candidate),
            None => Err(LeadScoutError::PlatformUnavailable(format!(
                "{} is not configured for enrichment",
                self.platform
            ))),
        }
    }
}

// ── demo data ────────────────────────────────────────────────────────────

const NAME_POOL: [&str; 10] = [
    "Atlas", "Harbor", "Summit", "Cedar", "Union", "Crown", "Nova", "Mill", "Juniper", "Beacon",
];

fn stable_seed(parts: &[&str]) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    for p in parts {
        p.hash(&mut h);
    }
    h.finish()
}

fn title_word(s: &str) -> String {
    let head = s.split_whitespace().next().unwrap_or("Local");
    let mut chars = head.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Local".to_string(),
    }
}

/// Deterministic sample candidates for the demo adapters.
///
/// Names depend only on industry and location, not on the platform, so
/// discovery across several platforms produces overlapping businesses and
/// exercises deduplication.
fn demo_candidates(platform: Platform, criteria: &SearchCriteria, limit: u32) -> Vec<Candidate> {
    let seed = stable_seed(&[&criteria.industry, &criteria.location]);
    let word = title_word(&criteria.industry);
    let count = limit.min(8) as usize;
    (0..count)
        .map(|i| {
            let pick = ((seed >> (i % 8)) as usize + i) % NAME_POOL.len();
            let name = format!("{} {} Co", NAME_POOL[pick], word);
            let mut candidate = Candidate::new(name, criteria.location.clone());
            candidate = match platform {
                Platform::GoogleMaps => candidate
                    .with_field("address", format!("{} Main St, {}", 100 + i * 7, criteria.location))
                    .with_field("rating", format!("{}.{}", 3 + (seed as usize + i) % 2, i % 10)),
                Platform::Facebook => candidate
                    .with_field("website", format!("https://{}.example.com", NAME_POOL[pick].to_lowercase())),
                _ => candidate,
            };
            candidate
        })
        .collect()
}

fn demo_attributes(platform: Platform, candidate: &Candidate) -> AttributeSet {
    let seed = stable_seed(&[&candidate.business_name, platform.as_str()]);
    let handle = candidate
        .business_name
        .split_whitespace()
        .next()
        .unwrap_or("local")
        .to_lowercase();
    match platform {
        Platform::GoogleBusiness => AttributeSet::new()
            .with_field("phone", format!("+1 555 {:04}", seed % 10_000))
            .with_field("hours", "Mon-Sat 9:00-18:00"),
        Platform::Facebook => AttributeSet::new()
            .with_field("website", format!("https://{handle}.example.com"))
            .with_field("email", format!("contact@{handle}.example.com")),
        Platform::Linkedin => AttributeSet::new()
            .with_field("employee_count", format!("{}", 5 + seed % 200))
            .with_field("linkedin_url", format!("https://linkedin.com/company/{handle}")),
        Platform::Instagram => AttributeSet::new()
            .with_field("instagram_handle", format!("@{handle}"))
            .with_field("followers", format!("{}", 300 + seed % 50_000)),
        Platform::GoogleMaps => AttributeSet::new()
            .with_field("address", format!("{} Main St, {}", 100 + seed % 800, candidate.location)),
        Platform::GoogleSearch => AttributeSet::new(),
    }
}

/// The demo adapter set wired by the server binary when no real
/// connectors are configured.
///
/// Google Maps and Facebook support both stages, Google Search is
/// discovery-only, and the rest are enrichment-only. All output is
/// deterministic for a given request.
pub fn demo_catalog() -> Vec<Arc<ScriptedAdapter>> {
    let both = |platform: Platform| {
        ScriptedAdapter::new(platform)
            .with_discover(move |criteria, limit| Ok(demo_candidates(platform, criteria, limit)))
            .with_enrich(move |candidate| Ok(demo_attributes(platform, candidate)))
    };
    let enrich_only = |platform: Platform| {
        ScriptedAdapter::new(platform)
            .with_enrich(move |candidate| Ok(demo_attributes(platform, candidate)))
    };
    vec![
        Arc::new(both(Platform::GoogleMaps)),
        Arc::new(both(Platform::Facebook)),
        Arc::new(
            ScriptedAdapter::new(Platform::GoogleSearch).with_discover(move |criteria, limit| {
                Ok(demo_candidates(Platform::GoogleSearch, criteria, limit))
            }),
        ),
        Arc::new(enrich_only(Platform::GoogleBusiness)),
        Arc::new(enrich_only(Platform::Linkedin)),
        Arc::new(enrich_only(Platform::Instagram)),
    ]
}
