/// Catalog data provider abstraction
///
/// A provider answers three questions about the book catalog: which books are
/// similar to a given ASIN, which books match a keyword query, and what the
/// full details of a single ASIN are. Results are returned in provider order.
use crate::{error::AppResult, models::BookCandidate};

pub mod audible;

pub use audible::AudibleProvider;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Ordered "similar items" for a seed ASIN, at most `limit` entries
    ///
    /// Returns an error when the similarity endpoint fails or has nothing
    /// for the seed, so callers can choose their own fallback.
    async fn similar(&self, asin: &str, limit: usize) -> AppResult<Vec<BookCandidate>>;

    /// Keyword search ordered by relevance, at most `limit` entries
    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<BookCandidate>>;

    /// Full details for one ASIN, `None` when no metadata source knows it
    async fn book(&self, asin: &str) -> AppResult<Option<BookCandidate>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
