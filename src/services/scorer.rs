use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use crate::{
    models::BookCandidate,
    services::{aggregator::Aggregation, profile::UserProfile},
};

pub const W_FREQUENCY: f64 = 10.0;
pub const W_RANK: f64 = 3.0;
pub const W_AUTHOR_PREF: f64 = 1.2;
pub const W_NARRATOR_PREF: f64 = 0.6;
pub const W_RECENT: f64 = 0.5;

/// Days over which the recency bonus decays to zero
const RECENCY_WINDOW_DAYS: f64 = 730.0;

const DEFAULT_REASON: &str = "because you requested similar books";

/// A candidate with its composite score and explanation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub book: BookCandidate,
    pub score: f64,
    pub frequency: u32,
    pub average_position: f64,
    pub reason: String,
    pub tie: u32,
}

fn rank_component(average_position: f64) -> f64 {
    1.0 / (1.0 + average_position)
}

/// Average preference count over the given names, 0 for an empty list
fn preference_component(names: &[String], count: impl Fn(&str) -> u32) -> f64 {
    if names.is_empty() {
        return 0.0;
    }
    let total: u32 = names.iter().map(|n| count(n)).sum();
    total as f64 / names.len() as f64
}

/// `max(0, 1 - age_days / 730)`, 0 when the release date is unknown
pub fn recency_bonus(release_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(released) = release_date else {
        return 0.0;
    };
    let age_days = (now - released).num_days().max(0) as f64;
    (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0)
}

/// First 32 bits of SHA-1 over `"{username}:{asin}"`
///
/// Stable per user, so equal scores come back in the same order every time.
pub fn tie_break(username: &str, asin: &str) -> u32 {
    let digest = Sha1::digest(format!("{}:{}", username, asin).as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn build_reason(
    book: &BookCandidate,
    frequency: u32,
    average_position: f64,
    recency: f64,
    profile: &UserProfile,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if frequency > 0 {
        parts.push(format!("Similar to {} of your books", frequency));
    }

    if average_position < 3.0 {
        parts.push("highly ranked in Audible sims".to_string());
    } else if average_position < 8.0 {
        parts.push("recommended by Audible sims".to_string());
    }

    let matched_authors: Vec<&str> = book
        .authors
        .iter()
        .filter(|a| profile.author_count(a) > 0)
        .map(String::as_str)
        .take(2)
        .collect();

    if !matched_authors.is_empty() {
        parts.push(format!("by your frequent author {}", matched_authors.join(", ")));
    } else if book.narrators.iter().any(|n| profile.narrator_count(n) > 0) {
        parts.push("narrated by a favorite narrator".to_string());
    }

    if recency > 0.6 {
        parts.push("recent release".to_string());
    }

    if parts.is_empty() {
        DEFAULT_REASON.to_string()
    } else {
        parts.join("; ")
    }
}

/// Score desc, then tie hash asc
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score.total_cmp(&a.score).then(a.tie.cmp(&b.tie))
}

/// Scores every aggregated candidate and returns them best first
///
/// Candidates the user already requested, already downloaded ones and those
/// the ownership check found are dropped before scoring.
pub fn score(
    aggregation: &Aggregation,
    profile: &UserProfile,
    owned: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = aggregation
        .iter()
        .filter(|(book, _)| {
            !book.downloaded
                && !profile.requested.contains(&book.asin)
                && !owned.contains(&book.asin)
        })
        .map(|(book, stats)| {
            let average_position = stats.average_position();
            let recency = recency_bonus(book.release_date, now);

            let score = W_FREQUENCY * stats.frequency as f64
                + W_RANK * rank_component(average_position)
                + W_AUTHOR_PREF * preference_component(&book.authors, |a| profile.author_count(a))
                + W_NARRATOR_PREF
                    * preference_component(&book.narrators, |n| profile.narrator_count(n))
                + W_RECENT * recency;

            ScoredCandidate {
                reason: build_reason(book, stats.frequency, average_position, recency, profile),
                tie: tie_break(&profile.username, &book.asin),
                book: book.clone(),
                score,
                frequency: stats.frequency,
                average_position,
            }
        })
        .collect();

    scored.sort_by(rank_order);
    scored
}
