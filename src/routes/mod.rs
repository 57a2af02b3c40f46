use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{LibrarySeeder, RecommendationEngine},
};

pub mod recommendations;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    /// Header set by the authenticating proxy
    pub auth_user_header: String,
    /// Default seeds for requests that name none
    pub library_seeds: Option<Arc<LibrarySeeder>>,
}

impl AppState {
    pub fn new(engine: Arc<RecommendationEngine>, auth_user_header: &str) -> Self {
        Self {
            engine,
            auth_user_header: auth_user_header.to_ascii_lowercase(),
            library_seeds: None,
        }
    }

    pub fn with_library_seeds(mut self, seeder: Arc<LibrarySeeder>) -> Self {
        self.library_seeds = Some(seeder);
        self
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/recommendations/for-you",
        get(recommendations::for_you),
    )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
