/// Audible catalog provider
///
/// API flow:
/// 1. Similar items: `/1.0/catalog/products/{asin}/sims` returns ASINs only
/// 2. Keyword search: `/1.0/catalog/products?keywords=...` returns ASINs only
/// 3. Details: Audimeta `/book/{asin}`, falling back to Audnexus `/books/{asin}`
///
/// ASINs already present in the request store (and fresher than a week) are
/// reused instead of refetched; newly resolved books are written back as
/// catalog rows.
use crate::{
    cached,
    config::Config,
    db::{Cache, CacheKey, RequestStore},
    error::{AppError, AppResult},
    models::{
        catalog::{decode_audimeta, decode_audnexus, decode_products, DecodeError},
        BookCandidate,
    },
    services::providers::CatalogProvider,
};
use reqwest::Client as HttpClient;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CATALOG_CACHE_TTL: u64 = 604800; // 1 week
const MAX_SIMS_RESULTS: usize = 50;
const CLIENT_AGENT: &str = "shelfwise";

/// Metadata services that can resolve a single ASIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataSource {
    Audimeta,
    Audnexus,
}

impl MetadataSource {
    const ORDER: [MetadataSource; 2] = [MetadataSource::Audimeta, MetadataSource::Audnexus];

    fn name(self) -> &'static str {
        match self {
            MetadataSource::Audimeta => "audimeta",
            MetadataSource::Audnexus => "audnexus",
        }
    }

    fn decode(self, body: &str) -> Result<BookCandidate, DecodeError> {
        match self {
            MetadataSource::Audimeta => decode_audimeta(body),
            MetadataSource::Audnexus => decode_audnexus(body),
        }
    }
}

#[derive(Clone)]
pub struct AudibleProvider {
    http_client: HttpClient,
    api_url: String,
    audimeta_url: String,
    audnexus_url: String,
    region: String,
    cache: Cache,
    store: Arc<dyn RequestStore>,
}

impl AudibleProvider {
    pub fn new(config: &Config, cache: Cache, store: Arc<dyn RequestStore>) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.audible_base_url(),
            audimeta_url: config.audimeta_url.trim_end_matches('/').to_string(),
            audnexus_url: config.audnexus_url.trim_end_matches('/').to_string(),
            region: config.audible_region.to_lowercase(),
            cache,
            store,
        })
    }

    /// Fetches an Audible product listing and returns its ASINs in order
    async fn fetch_product_asins(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> AppResult<Vec<String>> {
        let response = self.http_client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Audible API returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        Ok(decode_products(&body)?)
    }

    async fn fetch_similar_uncached(
        &self,
        asin: &str,
        limit: usize,
    ) -> AppResult<Vec<BookCandidate>> {
        let url = format!("{}/1.0/catalog/products/{}/sims", self.api_url, asin);
        let num_results = limit.clamp(1, MAX_SIMS_RESULTS);

        let asins = self
            .fetch_product_asins(&url, &[("num_results", num_results.to_string())])
            .await?;

        if asins.is_empty() {
            return Err(AppError::ExternalApi(format!(
                "No sims returned for {}",
                asin
            )));
        }

        let mut books = self.resolve_books(&asins).await;
        books.truncate(limit);

        tracing::info!(
            asin = %asin,
            results = books.len(),
            provider = "audible",
            "Similar items fetched"
        );

        Ok(books)
    }

    async fn fetch_search_uncached(
        &self,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<BookCandidate>> {
        let url = format!("{}/1.0/catalog/products", self.api_url);

        let asins = self
            .fetch_product_asins(
                &url,
                &[
                    ("num_results", limit.to_string()),
                    ("products_sort_by", "Relevance".to_string()),
                    ("keywords", query.to_string()),
                    ("page", "0".to_string()),
                ],
            )
            .await?;

        let mut books = self.resolve_books(&asins).await;
        books.truncate(limit);

        tracing::info!(
            query = %query,
            results = books.len(),
            provider = "audible",
            "Keyword search completed"
        );

        Ok(books)
    }

    /// Turns an ordered ASIN list into books, keeping the input order
    ///
    /// ASINs that no source can resolve are dropped.
    async fn resolve_books(&self, asins: &[String]) -> Vec<BookCandidate> {
        let mut known = match self.store.existing_books(asins).await {
            Ok(books) => books,
            Err(e) => {
                tracing::warn!(error = %e, "Catalog lookup failed, resolving all details remotely");
                HashMap::new()
            }
        };

        let mut seen = HashSet::new();
        let missing: Vec<String> = asins
            .iter()
            .filter(|a| !known.contains_key(*a) && seen.insert((*a).clone()))
            .cloned()
            .collect();

        let fetched = self.fetch_details_batch(missing).await;

        if let Err(e) = self.store.store_books(&fetched).await {
            tracing::warn!(error = %e, count = fetched.len(), "Failed to store resolved books");
        }

        for book in fetched {
            known.insert(book.asin.clone(), book);
        }

        asins.iter().filter_map(|a| known.get(a).cloned()).collect()
    }

    /// Resolves details for several ASINs in parallel
    async fn fetch_details_batch(&self, asins: Vec<String>) -> Vec<BookCandidate> {
        let mut tasks = Vec::new();

        for asin in asins {
            let provider = self.clone();
            let task = tokio::spawn(async move { provider.book(&asin).await });
            tasks.push(task);
        }

        let mut books = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Ok(Some(book))) => books.push(book),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Detail fetch failed"),
                Err(e) => tracing::error!(error = %e, "Task join error"),
            }
        }

        books
    }

    async fn fetch_metadata(
        &self,
        source: MetadataSource,
        asin: &str,
    ) -> AppResult<Option<BookCandidate>> {
        let url = match source {
            MetadataSource::Audimeta => format!("{}/book/{}", self.audimeta_url, asin),
            MetadataSource::Audnexus => format!("{}/books/{}", self.audnexus_url, asin),
        };

        tracing::debug!(asin = %asin, source = source.name(), "Fetching book details");

        let response = self
            .http_client
            .get(&url)
            .header("Client-Agent", CLIENT_AGENT)
            .query(&[("region", self.region.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(
                asin = %asin,
                source = source.name(),
                status = %response.status(),
                "Metadata source did not return the book"
            );
            return Ok(None);
        }

        let body = response.text().await?;
        Ok(Some(source.decode(&body)?))
    }
}

#[async_trait::async_trait]
impl CatalogProvider for AudibleProvider {
    async fn similar(&self, asin: &str, limit: usize) -> AppResult<Vec<BookCandidate>> {
        if asin.trim().is_empty() {
            return Err(AppError::InvalidInput("Seed ASIN cannot be empty".to_string()));
        }

        cached!(
            self.cache,
            CacheKey::Similar {
                region: self.region.clone(),
                asin: asin.to_string(),
                limit,
            },
            CATALOG_CACHE_TTL,
            self.fetch_similar_uncached(asin, limit)
        )
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<BookCandidate>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::Search {
                region: self.region.clone(),
                query: query.to_string(),
                limit,
            },
            CATALOG_CACHE_TTL,
            self.fetch_search_uncached(query, limit)
        )
    }

    async fn book(&self, asin: &str) -> AppResult<Option<BookCandidate>> {
        for source in MetadataSource::ORDER {
            match self.fetch_metadata(source, asin).await {
                Ok(Some(book)) => return Ok(Some(book)),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        asin = %asin,
                        source = source.name(),
                        error = %e,
                        "Exception while fetching book details"
                    );
                }
            }
        }

        tracing::warn!(asin = %asin, region = %self.region, "No metadata source has the book");
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "audible"
    }
}
