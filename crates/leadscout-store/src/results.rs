use crate::identity::identity_key;
use crate::score::confidence_score;
use chrono::Utc;
use leadscout_core::{AttributeSet, Candidate, Lead, LeadField, Platform};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// What happened to one candidate during insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new lead was created.
    Inserted,
    /// The candidate matched an existing lead and was merged into it.
    Merged,
    /// Dropped: the job was at its result cap or already frozen.
    Discarded,
}

/// Field-source precedence when two platforms disagree on a value.
///
/// A write only replaces an existing value when it comes from a strictly
/// higher-authority platform; equal or lower authority keeps what is
/// already there.
fn authority(platform: Platform) -> u8 {
    match platform {
        Platform::GoogleBusiness => 6,
        Platform::GoogleMaps => 5,
        Platform::Linkedin => 4,
        Platform::Facebook => 3,
        Platform::Instagram => 2,
        Platform::GoogleSearch => 1,
    }
}

/// Merge one attribute into a lead's field map. Returns whether anything
/// changed.
fn merge_field(
    fields: &mut BTreeMap<String, LeadField>,
    name: String,
    value: String,
    source: Platform,
    verify: bool,
) -> bool {
    match fields.get_mut(&name) {
        None => {
            fields.insert(
                name,
                LeadField {
                    value,
                    source,
                    verified: false,
                },
            );
            true
        }
        Some(existing) if existing.value == value => {
            // An independent platform agreeing confirms the value.
            if verify && !existing.verified && existing.source != source {
                existing.verified = true;
                true
            } else {
                false
            }
        }
        Some(existing) if authority(source) > authority(existing.source) => {
            existing.value = value;
            existing.source = source;
            existing.verified = false;
            true
        }
        Some(_) => false,
    }
}

struct JobResults {
    job_id: Uuid,
    max_results: usize,
    frozen: bool,
    leads: HashMap<String, Lead>,
}

impl JobResults {
    fn insert_candidate(&mut self, platform: Platform, candidate: Candidate) -> MergeOutcome {
        if self.frozen {
            return MergeOutcome::Discarded;
        }
        let key = identity_key(&candidate.business_name, &candidate.location);
        if let Some(lead) = self.leads.get_mut(&key) {
            for (name, value) in candidate.fields {
                merge_field(&mut lead.fields, name, value, platform, false);
            }
            lead.provenance.insert(platform);
            lead.confidence_score = lead.confidence_score.max(confidence_score(lead));
            MergeOutcome::Merged
        } else if self.leads.len() < self.max_results {
            let mut lead = Lead {
                id: Uuid::new_v4(),
                job_id: self.job_id,
                identity_key: key.clone(),
                business_name: candidate.business_name,
                location: candidate.location,
                fields: BTreeMap::new(),
                provenance: BTreeSet::from([platform]),
                confidence_score: 0,
                discovered_by: platform,
                created_at: Utc::now(),
            };
            for (name, value) in candidate.fields {
                lead.fields.insert(
                    name,
                    LeadField {
                        value,
                        source: platform,
                        verified: false,
                    },
                );
            }
            lead.confidence_score = confidence_score(&lead);
            self.leads.insert(key, lead);
            MergeOutcome::Inserted
        } else {
            MergeOutcome::Discarded
        }
    }

    fn merge_attributes(
        &mut self,
        key: &str,
        platform: Platform,
        attrs: AttributeSet,
        verify: bool,
    ) -> usize {
        if self.frozen || attrs.is_empty() {
            return 0;
        }
        let Some(lead) = self.leads.get_mut(key) else {
            return 0;
        };
        let mut changed = 0;
        for (name, value) in attrs.fields {
            if merge_field(&mut lead.fields, name, value, platform, verify) {
                changed += 1;
            }
        }
        // Returning data about the business corroborates it even when no
        // value won an authority contest.
        lead.provenance.insert(platform);
        lead.confidence_score = lead.confidence_score.max(confidence_score(lead));
        changed
    }
}

/// Accumulated leads per job, deduplicated and scored as they arrive.
///
/// Workers write here concurrently during enrichment; all dedup and merge
/// decisions happen under the per-job lock so interleaving order never
/// affects the outcome. Once [`ResultStore::freeze`] is called for a job,
/// later writes are silently discarded.
#[derive(Default)]
pub struct ResultStore {
    jobs: RwLock<HashMap<Uuid, Arc<RwLock<JobResults>>>>,
}

impl ResultStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the result bucket for a job. Idempotent.
    pub fn open_job(&self, job_id: Uuid, max_results: u32) {
        self.jobs
            .write()
            .entry(job_id)
            .or_insert_with(|| {
                Arc::new(RwLock::new(JobResults {
                    job_id,
                    max_results: max_results as usize,
                    frozen: false,
                    leads: HashMap::new(),
                }))
            });
    }

    fn bucket(&self, job_id: Uuid) -> Option<Arc<RwLock<JobResults>>> {
        self.jobs.read().get(&job_id).cloned()
    }

    /// Deduplicate and insert discovery output, up to the job's cap.
    ///
    /// Returns one outcome per candidate, in input order.
    pub fn insert_candidates(
        &self,
        job_id: Uuid,
        platform: Platform,
        candidates: Vec<Candidate>,
    ) -> Vec<MergeOutcome> {
        let Some(bucket) = self.bucket(job_id) else {
            return vec![MergeOutcome::Discarded; candidates.len()];
        };
        let mut results = bucket.write();
        candidates
            .into_iter()
            .map(|c| results.insert_candidate(platform, c))
            .collect()
    }

    /// Merge enrichment output into an existing lead.
    ///
    /// `verify` marks fields confirmed by an independent equal value, used
    /// by premium verification passes. Returns the number of fields
    /// changed; an unknown lead or a frozen job merges nothing.
    pub fn merge_attributes(
        &self,
        job_id: Uuid,
        key: &str,
        platform: Platform,
        attrs: AttributeSet,
        verify: bool,
    ) -> usize {
        let Some(bucket) = self.bucket(job_id) else {
            debug!(job_id = %job_id, "merge into unknown job discarded");
            return 0;
        };
        let changed = bucket.write().merge_attributes(key, platform, attrs, verify);
        changed
    }

    /// Fetch one lead by its dedup key.
    pub fn lead(&self, job_id: Uuid, key: &str) -> Option<Lead> {
        let bucket = self.bucket(job_id)?;
        let results = bucket.read();
        results.leads.get(key).cloned()
    }

    /// All leads for a job, best first (score descending, then name).
    pub fn leads(&self, job_id: Uuid) -> Vec<Lead> {
        let Some(bucket) = self.bucket(job_id) else {
            return Vec::new();
        };
        let results = bucket.read();
        let mut leads: Vec<Lead> = results.leads.values().cloned().collect();
        leads.sort_by(|a, b| {
            b.confidence_score
                .cmp(&a.confidence_score)
                .then_with(|| a.business_name.cmp(&b.business_name))
        });
        leads
    }

    /// Number of leads currently held for a job.
    pub fn count(&self, job_id: Uuid) -> usize {
        self.bucket(job_id).map_or(0, |b| b.read().leads.len())
    }

    /// Stop accepting writes for a job. Later inserts and merges are
    /// discarded without error.
    pub fn freeze(&self, job_id: Uuid) {
        if let Some(bucket) = self.bucket(job_id) {
            bucket.write().frozen = true;
        }
    }

    /// Drop a job's results entirely, for retention sweeps.
    pub fn remove_job(&self, job_id: Uuid) {
        self.jobs.write().remove(&job_id);
    }
}
