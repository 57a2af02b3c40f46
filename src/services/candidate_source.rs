use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::BookCandidate,
    services::providers::CatalogProvider,
};

/// Turns provider calls into infallible candidate lists
///
/// Every provider failure is logged here and degrades to a smaller (possibly
/// empty) list, so the aggregation stage only ever sees `Vec<BookCandidate>`.
#[derive(Clone)]
pub struct CandidateSource {
    provider: Arc<dyn CatalogProvider>,
    timeout: Duration,
}

impl CandidateSource {
    pub fn new(provider: Arc<dyn CatalogProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Similar books for a seed, at most `max`, in provider order
    ///
    /// When the similarity lookup fails the seed's primary author (or title)
    /// is searched instead, with the seed itself removed from the results.
    pub async fn fetch_similar(&self, seed: &str, max: usize) -> Vec<BookCandidate> {
        if max == 0 {
            return Vec::new();
        }

        match self.bounded(self.provider.similar(seed, max)).await {
            Ok(mut books) => {
                books.retain(|b| b.asin != seed);
                books.truncate(max);
                return books;
            }
            Err(e) => {
                tracing::warn!(
                    seed = %seed,
                    provider = self.provider.name(),
                    error = %e,
                    "Similar lookup failed, falling back to author search"
                );
            }
        }

        match self.bounded(self.search_like(seed, max)).await {
            Ok(books) => books,
            Err(e) => {
                tracing::warn!(seed = %seed, error = %e, "Fallback search failed");
                Vec::new()
            }
        }
    }

    /// Keyword search results, at most `max`, never failing
    pub async fn fetch_search(&self, query: &str, max: usize) -> Vec<BookCandidate> {
        if max == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        match self.bounded(self.provider.search(query, max)).await {
            Ok(mut books) => {
                books.truncate(max);
                books
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    async fn search_like(&self, seed: &str, max: usize) -> AppResult<Vec<BookCandidate>> {
        let Some(details) = self.provider.book(seed).await? else {
            tracing::debug!(seed = %seed, "Seed details unavailable, no fallback query");
            return Ok(Vec::new());
        };

        let query = match details.primary_author() {
            Some(author) => author.to_string(),
            None => details.title.clone(),
        };

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // one extra so removing the seed still leaves `max`
        let mut books = self.provider.search(&query, max + 1).await?;
        books.retain(|b| b.asin != seed);
        books.truncate(max);

        tracing::debug!(seed = %seed, query = %query, results = books.len(), "Fallback search completed");
        Ok(books)
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "provider call exceeded {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}
