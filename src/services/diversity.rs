use std::collections::{HashMap, HashSet};

use crate::services::scorer::ScoredCandidate;

/// Accepted appearances per author at the head of a pool
pub const MAX_PER_AUTHOR: usize = 2;

/// Authors used for cap counting
///
/// A book without authors counts as the single pseudo-author `""`. Blank
/// names collapse into that same pseudo-author and repeats count once.
fn cap_keys(authors: &[String]) -> Vec<&str> {
    if authors.is_empty() {
        return vec![""];
    }

    let mut seen = HashSet::new();
    authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| seen.insert(*a))
        .collect()
}

/// Splits a scored list into the author-capped head and the deferred rest
///
/// Both halves keep their scored order.
pub fn partition_by_author(
    sorted: Vec<ScoredCandidate>,
    max_per_author: usize,
) -> (Vec<ScoredCandidate>, Vec<ScoredCandidate>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut accepted = Vec::new();
    let mut remainder = Vec::new();

    for candidate in sorted {
        let keys = cap_keys(&candidate.book.authors);

        if keys
            .iter()
            .any(|a| counts.get(*a).copied().unwrap_or(0) >= max_per_author)
        {
            remainder.push(candidate);
            continue;
        }

        for author in keys {
            *counts.entry(author.to_string()).or_insert(0) += 1;
        }
        accepted.push(candidate);
    }

    (accepted, remainder)
}

/// Greedy author cap: accepted candidates first, deferred ones after
pub fn diversify(sorted: Vec<ScoredCandidate>, max_per_author: usize) -> Vec<ScoredCandidate> {
    let (mut accepted, remainder) = partition_by_author(sorted, max_per_author);
    accepted.extend(remainder);
    accepted
}
