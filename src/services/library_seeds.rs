//! Default seeds taken from the media server library.

use std::sync::Arc;

use crate::{
    error::AppResult,
    models::library::LibraryItem,
    services::{candidate_source::CandidateSource, ownership::AudiobookshelfClient},
};

/// Library items read per request
pub const LIBRARY_SEED_ITEMS: usize = 24;

/// Items without an ASIN resolved through a catalog search
pub const MAX_SEED_LOOKUPS: usize = 10;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LibraryCatalog: Send + Sync {
    /// Most recently added items, newest first
    async fn recent_items(&self, limit: usize) -> AppResult<Vec<LibraryItem>>;
}

#[async_trait::async_trait]
impl LibraryCatalog for AudiobookshelfClient {
    async fn recent_items(&self, limit: usize) -> AppResult<Vec<LibraryItem>> {
        self.list_items(limit).await
    }
}

/// Turns the newest library items into seed ASINs
pub struct LibrarySeeder {
    library: Arc<dyn LibraryCatalog>,
    source: Arc<CandidateSource>,
}

impl LibrarySeeder {
    pub fn new(library: Arc<dyn LibraryCatalog>, source: Arc<CandidateSource>) -> Self {
        Self { library, source }
    }

    /// Library ASINs first, then top search hits for items without one
    ///
    /// Never fails; an unreachable library yields no seeds.
    pub async fn seeds(&self) -> Vec<String> {
        let items = match self.library.recent_items(LIBRARY_SEED_ITEMS).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Library listing failed, no library seeds");
                return Vec::new();
            }
        };

        let mut seeds: Vec<String> = Vec::new();
        for asin in items.iter().filter_map(|item| item.asin.as_deref()) {
            if !seeds.iter().any(|s| s == asin) {
                seeds.push(asin.to_string());
            }
        }

        let queries: Vec<String> = items
            .iter()
            .filter(|item| item.asin.is_none())
            .take(MAX_SEED_LOOKUPS)
            .map(lookup_query)
            .filter(|q| !q.is_empty())
            .collect();

        let mut tasks = Vec::new();
        for query in queries {
            let source = Arc::clone(&self.source);
            tasks.push(tokio::spawn(async move { source.fetch_search(&query, 1).await }));
        }

        let mut resolved = 0;
        for task in tasks {
            match task.await {
                Ok(hits) => {
                    if let Some(top) = hits.into_iter().next() {
                        if !seeds.contains(&top.asin) {
                            seeds.push(top.asin);
                            resolved += 1;
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Task join error"),
            }
        }

        tracing::debug!(
            items = items.len(),
            seeds = seeds.len(),
            resolved = resolved,
            "Library seeds collected"
        );

        seeds
    }
}

fn lookup_query(item: &LibraryItem) -> String {
    let author = item.authors.first().map(String::as_str).unwrap_or_default();
    format!("{} {}", item.title, author).trim().to_string()
}
