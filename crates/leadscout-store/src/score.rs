use leadscout_core::Lead;

/// Confidence score for a lead's current merged state.
///
/// The score is a pure function of what has been merged, so re-running a
/// merge never changes it and any sequence of merges that grows the lead
/// can only raise it:
///
/// * 40 points for existing at all (a discovery hit),
/// * 8 per populated field, capped at 40,
/// * 2 per verified field, capped at 12,
/// * 2 per platform beyond the first, capped at 6.
pub fn confidence_score(lead: &Lead) -> u8 {
    weigh(
        lead.fields.len(),
        lead.verified_count(),
        lead.provenance.len(),
    )
}

fn weigh(field_count: usize, verified_count: usize, provenance_count: usize) -> u8 {
    let base = 40u32;
    let fields = (field_count as u32 * 8).min(40);
    let verified = (verified_count as u32 * 2).min(12);
    let reach = (provenance_count.saturating_sub(1) as u32 * 2).min(6);
    (base + fields + verified + reach).min(100) as u8
}
