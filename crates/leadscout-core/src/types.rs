use crate::{LeadScoutError, LeadScoutResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// External data source a task runs against.
///
/// The set is fixed; new sources are added by extending this enum and
/// registering an adapter for it. Orchestration logic never names a
/// concrete platform beyond the configured default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Google Maps place listings.
    GoogleMaps,
    /// Google Business profiles.
    GoogleBusiness,
    /// LinkedIn company pages.
    Linkedin,
    /// Facebook business pages.
    Facebook,
    /// Instagram business accounts.
    Instagram,
    /// Plain Google search results.
    GoogleSearch,
}

impl Platform {
    /// Every known platform, in a stable order.
    pub const ALL: [Platform; 6] = [
        Platform::GoogleMaps,
        Platform::GoogleBusiness,
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Instagram,
        Platform::GoogleSearch,
    ];

    /// The wire name of the platform (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleMaps => "google_maps",
            Platform::GoogleBusiness => "google_business",
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::GoogleSearch => "google_search",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrichment depth requested for a job.
///
/// Intensity governs depth only: `basic` skips enrichment entirely,
/// `standard` adds one cross-platform pass, `premium` queries every
/// enrichment-capable platform and re-verifies already-merged fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    /// Discovery only; no enrichment tasks are dispatched.
    Basic,
    /// Discovery plus one enrichment pass on complementary platforms.
    #[default]
    Standard,
    /// Discovery plus enrichment on all platforms with field verification.
    Premium,
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intensity::Basic => write!(f, "basic"),
            Intensity::Standard => write!(f, "standard"),
            Intensity::Premium => write!(f, "premium"),
        }
    }
}

/// A validated lead-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Target industry, e.g. "restaurants". Required, non-empty.
    pub industry: String,
    /// Target location, e.g. "San Francisco, CA". Required, non-empty.
    pub location: String,
    /// Search radius in kilometers, 1–100.
    #[serde(default = "default_radius")]
    pub radius: u32,
    /// Upper bound on leads kept for the job, 1–1000.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Optional refinement keywords, at most five.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Optional job-title filter applied during enrichment.
    #[serde(default)]
    pub job_title: Option<String>,
    /// Enrichment depth.
    #[serde(default)]
    pub intensity: Intensity,
    /// Platforms to run discovery against. Defaults to Google Maps.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    /// Optional URL notified with a completion payload when the job
    /// reaches a terminal state.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_radius() -> u32 {
    25
}

fn default_max_results() -> u32 {
    100
}

fn default_platforms() -> Vec<Platform> {
    vec![Platform::GoogleMaps]
}

/// Maximum number of refinement keywords per request.
pub const MAX_KEYWORDS: usize = 5;

impl SearchCriteria {
    /// Minimal criteria with defaults for everything optional.
    pub fn new(industry: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            industry: industry.into(),
            location: location.into(),
            radius: default_radius(),
            max_results: default_max_results(),
            keywords: Vec::new(),
            job_title: None,
            intensity: Intensity::default(),
            platforms: default_platforms(),
            webhook_url: None,
        }
    }

    /// Set the enrichment intensity.
    pub fn with_intensity(mut self, intensity: Intensity) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the discovery platform list.
    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Set the lead cap.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Validate the request bounds.
    ///
    /// Returns the first violation as [`LeadScoutError::Validation`]; a
    /// request that passes here is safe to enqueue.
    pub fn validate(&self) -> LeadScoutResult<()> {
        if self.industry.trim().is_empty() {
            return Err(LeadScoutError::Validation(
                "industry must not be empty".into(),
            ));
        }
        if self.location.trim().is_empty() {
            return Err(LeadScoutError::Validation(
                "location must not be empty".into(),
            ));
        }
        if !(1..=100).contains(&self.radius) {
            return Err(LeadScoutError::Validation(format!(
                "radius must be between 1 and 100 km, got {}",
                self.radius
            )));
        }
        if !(1..=1000).contains(&self.max_results) {
            return Err(LeadScoutError::Validation(format!(
                "max_results must be between 1 and 1000, got {}",
                self.max_results
            )));
        }
        if self.platforms.is_empty() {
            return Err(LeadScoutError::Validation(
                "at least one discovery platform is required".into(),
            ));
        }
        if self.keywords.len() > MAX_KEYWORDS {
            return Err(LeadScoutError::Validation(format!(
                "at most {MAX_KEYWORDS} keywords allowed, got {}",
                self.keywords.len()
            )));
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(LeadScoutError::Validation(
                "keywords must not be empty strings".into(),
            ));
        }
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(LeadScoutError::Validation(format!(
                    "webhook_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(())
    }
}

/// A business returned by a discovery call, before deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Raw business name as reported by the platform.
    pub business_name: String,
    /// Raw location string as reported by the platform.
    pub location: String,
    /// Initial attributes known at discovery time (address, website, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Candidate {
    /// Create a candidate with no initial attributes.
    pub fn new(business_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            location: location.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach an initial attribute.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Attributes returned by one enrichment call for one candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Attribute name to value.
    pub fields: BTreeMap<String, String>,
}

impl AttributeSet {
    /// An empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an attribute.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// True when the enrichment produced nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One attribute of a [`Lead`], with the platform that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadField {
    /// The attribute value.
    pub value: String,
    /// Platform whose write currently holds the field.
    pub source: Platform,
    /// Set when a premium re-verification pass confirmed the value.
    #[serde(default)]
    pub verified: bool,
}

/// One deduplicated, scored business record accumulated for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead identifier.
    pub id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// Normalized `business_name|location` dedup key.
    pub identity_key: String,
    /// Business name as first discovered.
    pub business_name: String,
    /// Location as first discovered.
    pub location: String,
    /// Merged attributes, keyed by attribute name.
    pub fields: BTreeMap<String, LeadField>,
    /// Platforms that contributed at least one field or the discovery itself.
    pub provenance: BTreeSet<Platform>,
    /// Aggregate confidence, 0–100, non-decreasing over the job's lifetime.
    pub confidence_score: u8,
    /// Platform whose discovery produced this lead.
    pub discovered_by: Platform,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Number of fields confirmed by a verification pass.
    pub fn verified_count(&self) -> usize {
        self.fields.values().filter(|f| f.verified).count()
    }

    /// Current value of a field, if present.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }

    /// Snapshot of the lead in candidate form, used as enrichment input.
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            business_name: self.business_name.clone(),
            location: self.location.clone(),
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_serde_names() {
        let json = serde_json::to_string(&Platform::GoogleMaps).unwrap();
        assert_eq!(json, "\"google_maps\"");
        let p: Platform = serde_json::from_str("\"linkedin\"").unwrap();
        assert_eq!(p, Platform::Linkedin);
    }

    #[test]
    fn test_platform_display_matches_serde() {
        for p in Platform::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{p}\""));
        }
    }

    #[test]
    fn test_intensity_default_is_standard() {
        assert_eq!(Intensity::default(), Intensity::Standard);
    }

    #[test]
    fn test_criteria_defaults() {
        let c = SearchCriteria::new("restaurants", "San Francisco, CA");
        assert_eq!(c.radius, 25);
        assert_eq!(c.max_results, 100);
        assert_eq!(c.platforms, vec![Platform::GoogleMaps]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_criteria_rejects_empty_industry() {
        let c = SearchCriteria::new("   ", "Austin, TX");
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("industry"));
    }

    #[test]
    fn test_criteria_rejects_out_of_range_radius() {
        let mut c = SearchCriteria::new("cafes", "Austin, TX");
        c.radius = 0;
        assert!(c.validate().is_err());
        c.radius = 101;
        assert!(c.validate().is_err());
        c.radius = 100;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_criteria_rejects_empty_platform_list() {
        let mut c = SearchCriteria::new("cafes", "Austin, TX");
        c.platforms = Vec::new();
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("platform"));
    }

    #[test]
    fn test_criteria_rejects_too_many_keywords() {
        let mut c = SearchCriteria::new("cafes", "Austin, TX");
        c.keywords = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()];
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("keywords"));
    }

    #[test]
    fn test_criteria_rejects_bad_webhook_url() {
        let mut c = SearchCriteria::new("cafes", "Austin, TX");
        c.webhook_url = Some("ftp://example.com/hook".into());
        assert!(c.validate().is_err());
        c.webhook_url = Some("https://example.com/hook".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_criteria_deserializes_with_defaults() {
        let json = r#"{"industry": "plumbers", "location": "Denver, CO"}"#;
        let c: SearchCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(c.max_results, 100);
        assert_eq!(c.intensity, Intensity::Standard);
        assert!(c.webhook_url.is_none());
    }

    #[test]
    fn test_candidate_builder() {
        let c = Candidate::new("Tony's Pizza", "San Francisco, CA")
            .with_field("website", "https://tonys.example.com");
        assert_eq!(c.fields.len(), 1);
        assert_eq!(c.business_name, "Tony's Pizza");
    }

    #[test]
    fn test_lead_as_candidate_snapshot() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "phone".to_string(),
            LeadField {
                value: "+1 555 0100".to_string(),
                source: Platform::GoogleBusiness,
                verified: false,
            },
        );
        let lead = Lead {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            identity_key: "tonys pizza|san francisco ca".into(),
            business_name: "Tony's Pizza".into(),
            location: "San Francisco, CA".into(),
            fields,
            provenance: BTreeSet::from([Platform::GoogleMaps, Platform::GoogleBusiness]),
            confidence_score: 56,
            discovered_by: Platform::GoogleMaps,
            created_at: Utc::now(),
        };
        let snapshot = lead.as_candidate();
        assert_eq!(snapshot.fields.get("phone").map(String::as_str), Some("+1 555 0100"));
        assert_eq!(lead.verified_count(), 0);
    }
}
