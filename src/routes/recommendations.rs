use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::RecommendationPool,
    routes::AppState,
    services::{page, Page, DEFAULT_POOL_SIZE},
};

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    24
}

#[derive(Debug, Deserialize)]
pub struct ForYouQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    /// Comma separated ASINs; library seeds are used when absent
    #[serde(default)]
    pub seeds: Option<String>,
}

impl ForYouQuery {
    fn seed_list(&self) -> Vec<String> {
        self.seeds
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn authenticated_user(headers: &HeaderMap, header: &str) -> AppResult<String> {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("Missing authenticated user".to_string()))
}

/// Handler for the personalized "for you" listing
///
/// Without explicit seeds the recent library items seed the pool. A failed
/// pool build is logged and served as an empty page.
pub async fn for_you(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<ForYouQuery>,
) -> AppResult<Json<Page>> {
    let username = authenticated_user(&headers, &state.auth_user_header)?;
    let mut seeds = params.seed_list();
    if seeds.is_empty() {
        if let Some(seeder) = &state.library_seeds {
            seeds = seeder.seeds().await;
        }
    }

    let pool = match state
        .engine
        .get_pool(&username, &seeds, DEFAULT_POOL_SIZE)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                username = %username,
                error = %e,
                "Recommendation pool unavailable"
            );
            Arc::new(RecommendationPool::empty())
        }
    };

    let result = page(&pool, params.page, params.per_page);

    tracing::debug!(
        request_id = %request_id,
        username = %username,
        source = %pool.source,
        page = result.page,
        items = result.items.len(),
        "For-you page served"
    );

    Ok(Json(result))
}
