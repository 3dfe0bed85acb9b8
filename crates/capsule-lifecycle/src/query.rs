//! Search, filter and sort over an already-fetched capsule list. No I/O.

use chrono::{DateTime, Utc};

use capsule_types::{Capsule, CapsuleQuery, SortBy, StatusFilter};

/// Keep the capsules matching every criterion of `query`, in input order.
pub fn filter(capsules: &[Capsule], query: &CapsuleQuery, now: DateTime<Utc>) -> Vec<Capsule> {
    let term = query.search_term.to_lowercase();
    let created_after = query.time_range.window().map(|window| now - window);

    capsules
        .iter()
        .filter(|c| matches_search(c, &term))
        .filter(|c| matches_status(c, query.status))
        .filter(|c| created_after.is_none_or(|cutoff| c.created_at >= cutoff))
        .cloned()
        .collect()
}

/// Stable sort: capsules with equal keys keep their relative order.
pub fn sort(mut capsules: Vec<Capsule>, sort_by: SortBy) -> Vec<Capsule> {
    match sort_by {
        SortBy::Newest => capsules.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortBy::Oldest => capsules.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortBy::UnlockDate => capsules.sort_by(|a, b| a.unlock_date.cmp(&b.unlock_date)),
    }
    capsules
}

/// Filter, then sort.
pub fn apply(capsules: &[Capsule], query: &CapsuleQuery, now: DateTime<Utc>) -> Vec<Capsule> {
    sort(filter(capsules, query, now), query.sort_by)
}

/// Split into `(locked, unlocked)`, preserving order within each side.
pub fn partition_by_status(capsules: &[Capsule]) -> (Vec<Capsule>, Vec<Capsule>) {
    capsules.iter().cloned().partition(Capsule::is_locked)
}

fn matches_search(capsule: &Capsule, lowered_term: &str) -> bool {
    lowered_term.is_empty()
        || capsule.title.to_lowercase().contains(lowered_term)
        || capsule.description.to_lowercase().contains(lowered_term)
}

fn matches_status(capsule: &Capsule, status: StatusFilter) -> bool {
    match status {
        StatusFilter::All => true,
        StatusFilter::Locked => !capsule.is_unlocked,
        StatusFilter::Unlocked => capsule.is_unlocked,
    }
}
