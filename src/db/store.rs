use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{BookCandidate, BookRequestRecord, PopularBook},
};

/// Access to persisted book requests and catalog cache rows
///
/// The recommendation engine only reads through this trait, apart from the
/// catalog write-through done when book details are resolved and the
/// downloaded flags set after ownership checks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RequestStore: Send + Sync {
    /// Most recent request records for a user, newest first
    async fn history(&self, username: &str, limit: i64) -> AppResult<Vec<BookRequestRecord>>;

    /// Titles ordered by number of distinct requesters, excluding downloaded ones
    async fn popularity(&self, limit: i64) -> AppResult<Vec<PopularBook>>;

    /// Catalog cache rows (not requested by anyone, not downloaded), newest first
    async fn catalog_items(&self, limit: i64) -> AppResult<Vec<BookCandidate>>;

    /// Known books for the given ASINs that are still fresh enough to reuse
    ///
    /// A book is flagged `downloaded` when any of its rows is.
    async fn existing_books(&self, asins: &[String]) -> AppResult<HashMap<String, BookCandidate>>;

    /// Inserts or refreshes catalog cache rows
    async fn store_books(&self, books: &[BookCandidate]) -> AppResult<()>;

    /// Flags every row for the given ASINs as downloaded
    async fn mark_downloaded(&self, asins: &[String]) -> AppResult<()>;
}
