use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{models::BookCandidate, services::candidate_source::CandidateSource};

/// Seeds fanned out per pool build
pub const MAX_SEEDS: usize = 20;

/// Similar items requested per seed
pub const PER_SEED_LIMIT: usize = 50;

/// How often, and where, a candidate showed up across seed lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationStats {
    pub frequency: u32,
    pub positions: Vec<usize>,
}

impl AggregationStats {
    pub fn average_position(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.iter().sum::<usize>() as f64 / self.positions.len() as f64
    }
}

/// Merged seed lists: stats and canonical book per ASIN
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub stats: HashMap<String, AggregationStats>,
    pub candidates: HashMap<String, BookCandidate>,
    /// ASINs in the order they were first seen
    pub first_seen: Vec<String>,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Candidates in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&BookCandidate, &AggregationStats)> {
        self.first_seen
            .iter()
            .filter_map(|asin| Some((self.candidates.get(asin)?, self.stats.get(asin)?)))
    }
}

/// Explicit seeds followed by the user's requested ASINs
///
/// Blank entries are dropped, duplicates keep their first position, and the
/// result is capped at [`MAX_SEEDS`].
pub fn collect_seeds(explicit: &[String], history: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    explicit
        .iter()
        .chain(history.iter())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .take(MAX_SEEDS)
        .map(str::to_string)
        .collect()
}

/// Folds per-seed lists into frequency and position statistics
///
/// Positions are zero-based within each list. The first instance of an ASIN
/// is kept as its canonical metadata. An ASIN repeated inside one list counts
/// once for that list.
pub fn merge(lists: Vec<Vec<BookCandidate>>) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for list in lists {
        let mut in_list = HashSet::new();
        for (position, book) in list.into_iter().enumerate() {
            if book.asin.trim().is_empty() || !in_list.insert(book.asin.clone()) {
                continue;
            }

            let stats = aggregation.stats.entry(book.asin.clone()).or_default();
            stats.frequency += 1;
            stats.positions.push(position);

            if !aggregation.candidates.contains_key(&book.asin) {
                aggregation.first_seen.push(book.asin.clone());
                aggregation.candidates.insert(book.asin.clone(), book);
            }
        }
    }

    aggregation
}

/// Fetches similar items for every seed concurrently and merges them
///
/// Returns `None` when there are no seeds or no seed produced a candidate.
/// Seed lists are merged in seed order, so the canonical instance of a shared
/// candidate is the one from the earliest seed.
pub async fn aggregate(
    source: &Arc<CandidateSource>,
    seeds: &[String],
    per_seed_limit: usize,
) -> Option<Aggregation> {
    if seeds.is_empty() {
        return None;
    }

    let mut tasks = Vec::new();

    for seed in seeds.iter().take(MAX_SEEDS) {
        let source = Arc::clone(source);
        let seed = seed.clone();
        let task =
            tokio::spawn(async move { source.fetch_similar(&seed, per_seed_limit).await });
        tasks.push(task);
    }

    let mut lists = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(books) => lists.push(books),
            Err(e) => tracing::error!(error = %e, "Seed task join error"),
        }
    }

    let aggregation = merge(lists);

    tracing::info!(
        seeds = seeds.len(),
        candidates = aggregation.len(),
        "Seed lists aggregated"
    );

    if aggregation.is_empty() {
        None
    } else {
        Some(aggregation)
    }
}
