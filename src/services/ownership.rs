use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Client as HttpClient;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        library::{decode_library_items, decode_library_search, normalize, LibraryItem, LibraryMatch},
        BookCandidate,
    },
};

/// Candidates offered to the checker per pool build
pub const OWNERSHIP_OFFER: usize = 30;

/// Candidates actually looked up, to keep load on the media server low
pub const OWNERSHIP_CHECK_LIMIT: usize = 25;

/// Best-effort "already in the library" lookup
///
/// Implementations never fail: anything that cannot be checked is reported as
/// not owned.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OwnershipChecker: Send + Sync {
    /// ASINs among `candidates` that the media server already has
    async fn owned(&self, candidates: &[BookCandidate]) -> HashSet<String>;
}

/// Used when no media server is configured
pub struct NoOwnershipChecker;

#[async_trait::async_trait]
impl OwnershipChecker for NoOwnershipChecker {
    async fn owned(&self, _candidates: &[BookCandidate]) -> HashSet<String> {
        HashSet::new()
    }
}

/// Client for one Audiobookshelf library
///
/// Serves ownership checks through the library search and lists recent items
/// for seeding.
#[derive(Clone)]
pub struct AudiobookshelfClient {
    http_client: HttpClient,
    base_url: String,
    api_token: String,
    library_id: String,
}

impl AudiobookshelfClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        library_id: &str,
        config: &Config,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            library_id: library_id.to_string(),
        })
    }

    /// The configured client, `None` unless server, token and library are set
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        match (
            &config.abs_base_url,
            &config.abs_api_token,
            &config.abs_library_id,
        ) {
            (Some(url), Some(token), Some(library)) => {
                tracing::info!(base_url = %url, library = %library, "Audiobookshelf configured");
                Ok(Some(Self::new(url, token, library, config)?))
            }
            _ => Ok(None),
        }
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> AppResult<String> {
        let url = format!(
            "{}/api/libraries/{}/{}",
            self.base_url, self.library_id, endpoint
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApi(format!(
                "Audiobookshelf {} returned status {}",
                endpoint,
                response.status()
            )));
        }

        Ok(response.text().await?)
    }

    async fn search(&self, query: &str) -> AppResult<Vec<LibraryMatch>> {
        let body = self.get("search", &[("q", query)]).await?;
        Ok(decode_library_search(&body)?)
    }

    /// Most recently added items, newest first
    pub async fn list_items(&self, limit: usize) -> AppResult<Vec<LibraryItem>> {
        let limit = limit.to_string();
        let body = self
            .get(
                "items",
                &[
                    ("limit", limit.as_str()),
                    ("sort", "addedAt"),
                    ("desc", "1"),
                    ("minified", "1"),
                ],
            )
            .await?;
        Ok(decode_library_items(&body)?)
    }

    /// Searches by ASIN first, then by "title author"
    async fn book_exists(&self, book: &BookCandidate) -> AppResult<bool> {
        let mut hits = Vec::new();
        if !book.asin.is_empty() {
            hits = self.search(&book.asin).await?;
        }
        if hits.is_empty() {
            let query = format!("{} {}", book.title, book.primary_author().unwrap_or_default());
            hits = self.search(query.trim()).await?;
        }

        Ok(hits.iter().any(|hit| is_same_book(book, hit)))
    }
}

/// The client as an ownership checker when checks are switched on
pub fn ownership_checker(
    client: Option<&AudiobookshelfClient>,
    config: &Config,
) -> Arc<dyn OwnershipChecker> {
    match client {
        Some(client) if config.abs_check_downloaded => {
            tracing::info!("Audiobookshelf ownership checks enabled");
            Arc::new(client.clone())
        }
        _ => Arc::new(NoOwnershipChecker),
    }
}

/// Normalized title equality plus at least one shared author
///
/// A book without authors matches on title alone.
pub fn is_same_book(book: &BookCandidate, hit: &LibraryMatch) -> bool {
    if normalize(&book.title) != normalize(&hit.title) {
        return false;
    }

    let authors: HashSet<String> = book.authors.iter().map(|a| normalize(a)).collect();
    authors.is_empty() || hit.authors.iter().any(|a| authors.contains(&normalize(a)))
}

#[async_trait::async_trait]
impl OwnershipChecker for AudiobookshelfClient {
    async fn owned(&self, candidates: &[BookCandidate]) -> HashSet<String> {
        let mut tasks = Vec::new();

        for book in candidates.iter().take(OWNERSHIP_CHECK_LIMIT) {
            let checker = self.clone();
            let book = book.clone();
            let task = tokio::spawn(async move {
                let exists = checker.book_exists(&book).await;
                (book.asin, exists)
            });
            tasks.push(task);
        }

        let mut owned = HashSet::new();
        for task in tasks {
            match task.await {
                Ok((asin, Ok(true))) => {
                    owned.insert(asin);
                }
                Ok((_, Ok(false))) => {}
                Ok((asin, Err(e))) => {
                    tracing::debug!(asin = %asin, error = %e, "Ownership check failed");
                }
                Err(e) => tracing::error!(error = %e, "Task join error"),
            }
        }

        tracing::debug!(checked = candidates.len().min(OWNERSHIP_CHECK_LIMIT), owned = owned.len(), "Ownership checked");
        owned
    }
}
