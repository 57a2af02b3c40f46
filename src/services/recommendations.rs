use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    db::RequestStore,
    error::AppResult,
    models::{RecommendationPool, RecommendationSource, RecommendedBook},
    services::{
        aggregator::{aggregate, collect_seeds, Aggregation, PER_SEED_LIMIT},
        candidate_source::CandidateSource,
        diversity::{diversify, MAX_PER_AUTHOR},
        fallback::{popularity_pool, preference_pool},
        ownership::{OwnershipChecker, OWNERSHIP_OFFER},
        pool_cache::PoolCache,
        profile::{build_profile, UserProfile},
        scorer::score,
    },
};

/// Pool size used by the "for you" listing
pub const DEFAULT_POOL_SIZE: usize = 240;

/// Catalog rows scanned per requested pool entry in the preference stage
const CATALOG_SCAN_FACTOR: usize = 5;

/// Builds personalized recommendation pools
///
/// Stages run in order until one produces a pool:
/// 1. sims: similar-items lists for the user's seeds, scored and diversified
/// 2. preference: catalog rows matching the user's authors and narrators
/// 3. popularity: titles with the most distinct requesters
pub struct RecommendationEngine {
    store: Arc<dyn RequestStore>,
    source: Arc<CandidateSource>,
    ownership: Arc<dyn OwnershipChecker>,
    pool_cache: PoolCache,
    history_limit: i64,
}

impl RecommendationEngine {
    pub fn new(
        store: Arc<dyn RequestStore>,
        source: Arc<CandidateSource>,
        ownership: Arc<dyn OwnershipChecker>,
        pool_cache: PoolCache,
        history_limit: i64,
    ) -> Self {
        Self {
            store,
            source,
            ownership,
            pool_cache,
            history_limit,
        }
    }

    /// Cached pool for the user and seed set, built on a miss
    pub async fn get_pool(
        &self,
        username: &str,
        seeds: &[String],
        pool_size: usize,
    ) -> AppResult<Arc<RecommendationPool>> {
        self.pool_cache
            .get_or_build(username, seeds, pool_size, move || {
                self.build_pool(username, seeds, pool_size)
            })
            .await
    }

    /// Runs the fallback chain without touching the cache
    ///
    /// Only a store failure while reading history or popularity is returned
    /// as an error.
    pub async fn build_pool(
        &self,
        username: &str,
        seeds: &[String],
        pool_size: usize,
    ) -> AppResult<RecommendationPool> {
        let profile = build_profile(self.store.as_ref(), username, self.history_limit).await?;

        if let Some(pool) = self.sims_stage(&profile, seeds, pool_size).await {
            return Ok(pool);
        }

        if profile.has_history() {
            match self.preference_stage(&profile, pool_size).await {
                Ok(Some(pool)) => return Ok(pool),
                Ok(None) => {
                    tracing::info!(username = %username, "No preference matches, using popularity");
                }
                Err(e) => {
                    tracing::warn!(username = %username, error = %e, "Preference stage failed, using popularity");
                }
            }
        }

        self.popularity_stage(&profile, pool_size).await
    }

    async fn sims_stage(
        &self,
        profile: &UserProfile,
        explicit: &[String],
        pool_size: usize,
    ) -> Option<RecommendationPool> {
        let seeds = collect_seeds(explicit, &profile.requested_order);
        if seeds.is_empty() {
            tracing::debug!(username = %profile.username, "No seeds, skipping sims stage");
            return None;
        }

        let aggregation = aggregate(&self.source, &seeds, PER_SEED_LIMIT).await?;

        // cached sims lists can predate a download, so the store has the last word
        let mut excluded = self.downloaded_in_store(&aggregation).await;

        let offered: Vec<_> = aggregation
            .iter()
            .filter(|(book, _)| {
                !book.downloaded
                    && !excluded.contains(&book.asin)
                    && !profile.requested.contains(&book.asin)
            })
            .map(|(book, _)| book.clone())
            .take(OWNERSHIP_OFFER)
            .collect();
        let owned = self.ownership.owned(&offered).await;
        if !owned.is_empty() {
            self.record_owned(&owned).await;
            excluded.extend(owned);
        }

        let pool = assemble_pool(&aggregation, profile, &excluded, pool_size, Utc::now());
        if pool.is_none() {
            tracing::info!(username = %profile.username, "Every sims candidate was excluded");
        }
        pool
    }

    async fn downloaded_in_store(&self, aggregation: &Aggregation) -> HashSet<String> {
        let asins: Vec<String> = aggregation.iter().map(|(book, _)| book.asin.clone()).collect();

        match self.store.existing_books(&asins).await {
            Ok(books) => books
                .into_values()
                .filter(|book| book.downloaded)
                .map(|book| book.asin)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Downloaded lookup failed, relying on candidate flags");
                HashSet::new()
            }
        }
    }

    /// Persists ownership hits so later builds skip them without a lookup
    async fn record_owned(&self, owned: &HashSet<String>) {
        let mut asins: Vec<String> = owned.iter().cloned().collect();
        asins.sort_unstable();

        if let Err(e) = self.store.mark_downloaded(&asins).await {
            tracing::warn!(owned = asins.len(), error = %e, "Failed to mark owned books as downloaded");
        }
    }

    async fn preference_stage(
        &self,
        profile: &UserProfile,
        pool_size: usize,
    ) -> AppResult<Option<RecommendationPool>> {
        let scan = pool_size.saturating_mul(CATALOG_SCAN_FACTOR);
        let catalog = self
            .store
            .catalog_items(i64::try_from(scan).unwrap_or(i64::MAX))
            .await?;
        Ok(preference_pool(catalog, profile, pool_size))
    }

    async fn popularity_stage(
        &self,
        profile: &UserProfile,
        pool_size: usize,
    ) -> AppResult<RecommendationPool> {
        // room for titles the user requested, which are filtered out
        let limit = pool_size.saturating_add(profile.requested.len());
        let popular = self
            .store
            .popularity(i64::try_from(limit).unwrap_or(i64::MAX))
            .await?;
        Ok(popularity_pool(popular, profile, pool_size))
    }
}

/// Score, diversify and cap an aggregation into a pool
///
/// Returns `None` when nothing survives the exclusions.
pub fn assemble_pool(
    aggregation: &Aggregation,
    profile: &UserProfile,
    owned: &HashSet<String>,
    pool_size: usize,
    now: DateTime<Utc>,
) -> Option<RecommendationPool> {
    let scored = score(aggregation, profile, owned, now);
    if scored.is_empty() {
        return None;
    }

    let mut pool = RecommendationPool {
        source: RecommendationSource::Sims,
        ..RecommendationPool::empty()
    };

    for candidate in diversify(scored, MAX_PER_AUTHOR)
        .into_iter()
        .take(pool_size)
    {
        pool.reasons
            .insert(candidate.book.asin.clone(), candidate.reason);
        pool.items.push(RecommendedBook::from(candidate.book));
    }

    Some(pool)
}
