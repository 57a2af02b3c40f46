use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display, sync::Arc};

pub mod catalog;
pub mod library;

/// A book as returned by the catalog, immutable once fetched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookCandidate {
    pub asin: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub narrators: Vec<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub runtime_length_min: i32,
    /// Already downloaded into the library by some user
    #[serde(default)]
    pub downloaded: bool,
}

impl BookCandidate {
    /// Primary author, if the catalog listed any
    pub fn primary_author(&self) -> Option<&str> {
        self.authors
            .first()
            .map(String::as_str)
            .filter(|a| !a.trim().is_empty())
    }
}

/// A row from the request store
///
/// Rows with a `user_username` are user requests; rows without one are
/// catalog cache entries written when book details are resolved.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BookRequestRecord {
    pub asin: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub cover_image: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub runtime_length_min: i32,
    pub user_username: Option<String>,
    pub downloaded: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<BookRequestRecord> for BookCandidate {
    fn from(record: BookRequestRecord) -> Self {
        Self {
            asin: record.asin,
            title: record.title,
            subtitle: record.subtitle,
            authors: record.authors,
            narrators: record.narrators,
            cover_image: record.cover_image,
            release_date: record.release_date,
            runtime_length_min: record.runtime_length_min,
            downloaded: record.downloaded,
        }
    }
}

/// Aggregate request count for a title across all users
#[derive(Debug, Clone, PartialEq)]
pub struct PopularBook {
    pub book: BookCandidate,
    pub requester_count: i64,
}

/// Read-only view of a recommended book returned to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedBook {
    pub asin: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub cover_image: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub runtime_length_min: i32,
    pub already_requested: bool,
}

impl From<BookCandidate> for RecommendedBook {
    fn from(book: BookCandidate) -> Self {
        Self {
            asin: book.asin,
            title: book.title,
            subtitle: book.subtitle,
            authors: book.authors,
            narrators: book.narrators,
            cover_image: book.cover_image,
            release_date: book.release_date,
            runtime_length_min: book.runtime_length_min,
            already_requested: false,
        }
    }
}

/// Which stage of the fallback chain produced a pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Sims,
    Preference,
    Popularity,
    None,
}

impl Display for RecommendationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationSource::Sims => write!(f, "sims"),
            RecommendationSource::Preference => write!(f, "preference"),
            RecommendationSource::Popularity => write!(f, "popularity"),
            RecommendationSource::None => write!(f, "none"),
        }
    }
}

/// Ordered, scored recommendation list plus the "why" for each entry
///
/// This is the unit stored in the pool cache. Items are unique by ASIN and
/// never contain titles the user already requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationPool {
    pub items: Vec<RecommendedBook>,
    pub reasons: HashMap<String, String>,
    pub source: RecommendationSource,
}

impl RecommendationPool {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            reasons: HashMap::new(),
            source: RecommendationSource::None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the pool limited to `limit` items
    ///
    /// Shares the same allocation when the pool already fits.
    pub fn capped(self: &Arc<Self>, limit: usize) -> Arc<Self> {
        if self.items.len() <= limit {
            return Arc::clone(self);
        }

        let items: Vec<RecommendedBook> = self.items[..limit].to_vec();
        let reasons = items
            .iter()
            .filter_map(|b| self.reasons.get(&b.asin).map(|r| (b.asin.clone(), r.clone())))
            .collect();

        Arc::new(Self {
            items,
            reasons,
            source: self.source,
        })
    }
}
