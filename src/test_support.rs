//! In-memory collaborators and builders shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::{
    db::RequestStore,
    error::{AppError, AppResult},
    models::{
        BookCandidate, BookRequestRecord, PopularBook, RecommendationPool, RecommendationSource,
        RecommendedBook,
    },
    services::{providers::CatalogProvider, scorer::{tie_break, ScoredCandidate}},
};

pub fn candidate(asin: &str, author: &str) -> BookCandidate {
    BookCandidate {
        asin: asin.to_string(),
        title: format!("Title {}", asin),
        subtitle: None,
        authors: vec![author.to_string()],
        narrators: vec![],
        cover_image: None,
        release_date: None,
        runtime_length_min: 600,
        downloaded: false,
    }
}

pub fn record(asin: &str, username: &str, author: &str) -> BookRequestRecord {
    BookRequestRecord {
        asin: asin.to_string(),
        title: format!("Title {}", asin),
        subtitle: None,
        authors: vec![author.to_string()],
        narrators: vec![],
        cover_image: None,
        release_date: None,
        runtime_length_min: 600,
        user_username: Some(username.to_string()),
        downloaded: false,
        updated_at: Utc::now(),
    }
}

pub fn popular(asin: &str, requester_count: i64) -> PopularBook {
    PopularBook {
        book: candidate(asin, "Popular Author"),
        requester_count,
    }
}

pub fn scored(book: BookCandidate, score: f64) -> ScoredCandidate {
    ScoredCandidate {
        tie: tie_break("test", &book.asin),
        book,
        score,
        frequency: 1,
        average_position: 0.0,
        reason: String::new(),
    }
}

/// Pool of `n` books `B000`, `B001`, ... each with a reason
pub fn pool_of(n: usize) -> RecommendationPool {
    let items: Vec<RecommendedBook> = (0..n)
        .map(|i| RecommendedBook::from(candidate(&format!("B{:03}", i), "Author")))
        .collect();
    let reasons = items
        .iter()
        .map(|b| (b.asin.clone(), format!("reason for {}", b.asin)))
        .collect();
    RecommendationPool {
        items,
        reasons,
        source: RecommendationSource::Sims,
    }
}

/// Catalog with canned similar lists
///
/// Seeds without a list fail, seeds marked hanging never answer.
#[derive(Default)]
pub struct FakeCatalog {
    similar: HashMap<String, Vec<BookCandidate>>,
    searches: HashMap<String, Vec<BookCandidate>>,
    books: HashMap<String, BookCandidate>,
    hanging: HashSet<String>,
    similar_calls: Arc<AtomicUsize>,
}

impl FakeCatalog {
    pub fn with_similar(mut self, seed: &str, books: Vec<BookCandidate>) -> Self {
        self.similar.insert(seed.to_string(), books);
        self
    }

    pub fn with_search(mut self, query: &str, books: Vec<BookCandidate>) -> Self {
        self.searches.insert(query.to_string(), books);
        self
    }

    pub fn with_book(mut self, book: BookCandidate) -> Self {
        self.books.insert(book.asin.clone(), book);
        self
    }

    pub fn with_hanging(mut self, seed: &str) -> Self {
        self.hanging.insert(seed.to_string());
        self
    }

    pub fn similar_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.similar_calls)
    }
}

#[async_trait::async_trait]
impl CatalogProvider for FakeCatalog {
    async fn similar(&self, asin: &str, limit: usize) -> AppResult<Vec<BookCandidate>> {
        self.similar_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(asin) {
            std::future::pending::<()>().await;
        }
        match self.similar.get(asin) {
            Some(books) => Ok(books.iter().take(limit).cloned().collect()),
            None => Err(AppError::ExternalApi(format!("No sims returned for {}", asin))),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<BookCandidate>> {
        Ok(self
            .searches
            .get(query)
            .map(|books| books.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn book(&self, asin: &str) -> AppResult<Option<BookCandidate>> {
        Ok(self.books.get(asin).cloned())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Request store backed by plain collections
#[derive(Default)]
pub struct FakeStore {
    history: HashMap<String, Vec<BookRequestRecord>>,
    popularity: Vec<PopularBook>,
    catalog: Vec<BookCandidate>,
    fail_popularity: bool,
    downloaded: HashSet<String>,
    marked: Arc<Mutex<Vec<String>>>,
}

impl FakeStore {
    pub fn with_history(mut self, username: &str, records: Vec<BookRequestRecord>) -> Self {
        self.history.insert(username.to_string(), records);
        self
    }

    pub fn with_popularity(mut self, popular: Vec<PopularBook>) -> Self {
        self.popularity = popular;
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<BookCandidate>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn failing_popularity(mut self) -> Self {
        self.fail_popularity = true;
        self
    }

    pub fn with_downloaded(mut self, asins: &[&str]) -> Self {
        self.downloaded.extend(asins.iter().map(|a| a.to_string()));
        self
    }

    /// ASINs passed to `mark_downloaded`, in call order
    pub fn marked_downloaded(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.marked)
    }
}

#[async_trait::async_trait]
impl RequestStore for FakeStore {
    async fn history(&self, username: &str, limit: i64) -> AppResult<Vec<BookRequestRecord>> {
        Ok(self
            .history
            .get(username)
            .map(|records| records.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn popularity(&self, limit: i64) -> AppResult<Vec<PopularBook>> {
        if self.fail_popularity {
            return Err(AppError::Internal("request store unreachable".to_string()));
        }
        Ok(self.popularity.iter().take(limit as usize).cloned().collect())
    }

    async fn catalog_items(&self, limit: i64) -> AppResult<Vec<BookCandidate>> {
        Ok(self.catalog.iter().take(limit as usize).cloned().collect())
    }

    async fn existing_books(&self, asins: &[String]) -> AppResult<HashMap<String, BookCandidate>> {
        Ok(asins
            .iter()
            .filter(|a| self.downloaded.contains(*a))
            .map(|a| {
                let mut book = candidate(a, "Stored Author");
                book.downloaded = true;
                (a.clone(), book)
            })
            .collect())
    }

    async fn store_books(&self, _books: &[BookCandidate]) -> AppResult<()> {
        Ok(())
    }

    async fn mark_downloaded(&self, asins: &[String]) -> AppResult<()> {
        if let Ok(mut marked) = self.marked.lock() {
            marked.extend(asins.iter().cloned());
        }
        Ok(())
    }
}
