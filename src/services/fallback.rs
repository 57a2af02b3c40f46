//! Pool builders for the stages that run without similarity data.

use std::collections::{HashMap, HashSet};

use crate::{
    models::{
        BookCandidate, PopularBook, RecommendationPool, RecommendationSource, RecommendedBook,
    },
    services::profile::UserProfile,
};

const AUTHOR_WEIGHT: u32 = 3;
const NARRATOR_WEIGHT: u32 = 2;

fn preference_score(book: &BookCandidate, profile: &UserProfile) -> u32 {
    let authors: u32 = book
        .authors
        .iter()
        .map(|a| profile.author_count(a) * AUTHOR_WEIGHT)
        .sum();
    let narrators: u32 = book
        .narrators
        .iter()
        .map(|n| profile.narrator_count(n) * NARRATOR_WEIGHT)
        .sum();
    authors + narrators
}

fn preference_reason(book: &BookCandidate, profile: &UserProfile) -> String {
    let matched: Vec<&str> = book
        .authors
        .iter()
        .filter(|a| profile.author_count(a) > 0)
        .map(String::as_str)
        .take(2)
        .collect();

    if matched.is_empty() {
        "narrated by a favorite narrator".to_string()
    } else {
        format!("by your frequent author {}", matched.join(", "))
    }
}

/// Scores unrequested catalog rows by the user's author and narrator counts
///
/// `catalog` is expected newest first; equal scores keep that order. Only
/// books with a positive score are kept. Returns `None` when nothing matches.
pub fn preference_pool(
    catalog: Vec<BookCandidate>,
    profile: &UserProfile,
    limit: usize,
) -> Option<RecommendationPool> {
    let mut seen = HashSet::new();
    let mut scored: Vec<(BookCandidate, u32)> = catalog
        .into_iter()
        .filter(|b| !b.downloaded && !profile.requested.contains(&b.asin))
        .filter(|b| seen.insert(b.asin.clone()))
        .map(|b| {
            let score = preference_score(&b, profile);
            (b, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    if scored.is_empty() {
        return None;
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);

    let mut reasons = HashMap::new();
    let items = scored
        .into_iter()
        .map(|(book, _)| {
            reasons.insert(book.asin.clone(), preference_reason(&book, profile));
            RecommendedBook::from(book)
        })
        .collect();

    Some(RecommendationPool {
        items,
        reasons,
        source: RecommendationSource::Preference,
    })
}

/// Most requested titles across all users, in store order
///
/// Items are flagged `already_requested` since someone has asked for them.
pub fn popularity_pool(
    popular: Vec<PopularBook>,
    profile: &UserProfile,
    limit: usize,
) -> RecommendationPool {
    let mut seen = HashSet::new();
    let mut reasons = HashMap::new();

    let items = popular
        .into_iter()
        .filter(|p| !p.book.downloaded && !profile.requested.contains(&p.book.asin))
        .filter(|p| seen.insert(p.book.asin.clone()))
        .take(limit)
        .map(|p| {
            let reason = match p.requester_count {
                1 => "requested by another reader".to_string(),
                n => format!("requested by {} readers", n),
            };
            reasons.insert(p.book.asin.clone(), reason);
            RecommendedBook {
                already_requested: true,
                ..RecommendedBook::from(p.book)
            }
        })
        .collect();

    RecommendationPool {
        items,
        reasons,
        source: RecommendationSource::Popularity,
    }
}
