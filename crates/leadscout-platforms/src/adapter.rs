use async_trait::async_trait;
use leadscout_core::{
    AttributeSet, Candidate, LeadScoutError, LeadScoutResult, Platform, SearchCriteria,
};

/// Static description of what an adapter can do.
#[derive(Debug, Clone, Copy)]
pub struct AdapterDescriptor {
    /// Platform this adapter serves.
    pub platform: Platform,
    /// Whether [`PlatformAdapter::discover`] is implemented.
    pub supports_discovery: bool,
    /// Whether [`PlatformAdapter::enrich`] is implemented.
    pub supports_enrichment: bool,
}

/// A connector to one external data source.
///
/// Adapters are capability-optional: a platform may support discovery,
/// enrichment, or both, and advertises which via its descriptor. The
/// default method bodies reject the call, so an implementation only
/// overrides what its descriptor claims.
///
/// Implementations must be cheap to call concurrently; rate limiting and
/// concurrency ceilings are enforced by the registry, not the adapter.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform and capabilities of this adapter.
    fn descriptor(&self) -> AdapterDescriptor;

    /// Search the platform for businesses matching `criteria`.
    ///
    /// Returns at most `limit` candidates. Order is platform-defined.
    async fn discover(
        &self,
        criteria: &SearchCriteria,
        limit: u32,
    ) -> LeadScoutResult<Vec<Candidate>> {
        let _ = (criteria, limit);
        Err(LeadScoutError::PlatformUnavailable(format!(
            "{} is not configured for discovery",
            self.descriptor().platform
        )))
    }

    /// Fetch additional attributes for one already-discovered business.
    ///
    /// An empty attribute set is a valid success: the platform simply had
    /// nothing to add.
    async fn enrich(&self, candidate: &Candidate) -> LeadScoutResult<AttributeSet> {
        let _ = candidate;
        Err(LeadScoutError::PlatformUnavailable(format!(
            "{} is not configured for enrichment",
            self.descriptor().platform
        )))
    }
}
