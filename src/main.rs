use std::sync::Arc;

use anyhow::Context;
use shelfwise_api::{
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgRequestStore, RequestStore},
    routes::{create_router, AppState},
    services::{
        ownership::ownership_checker, providers::AudibleProvider, AudiobookshelfClient,
        CandidateSource, LibrarySeeder, MokaPoolStore, PoolCache, RecommendationEngine,
    },
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;

    let pg_pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(pg_pool));

    // Redis only caches catalog responses, so the service runs without it
    let (cache, cache_handle) = match create_redis_client(&config.redis_url) {
        Ok(client) => match Cache::connect(client).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, catalog caching disabled");
                Cache::disabled()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Invalid Redis URL, catalog caching disabled");
            Cache::disabled()
        }
    };

    let provider = AudibleProvider::new(&config, cache, Arc::clone(&store))?;
    let source = Arc::new(CandidateSource::new(Arc::new(provider), config.sims_timeout()));
    let library = AudiobookshelfClient::from_config(&config)?;
    let ownership = ownership_checker(library.as_ref(), &config);
    let pool_cache = PoolCache::new(
        Arc::new(MokaPoolStore::new(
            config.pool_cache_capacity,
            config.pool_ttl(),
        )),
        config.pool_ttl(),
    );

    let engine = Arc::new(RecommendationEngine::new(
        store,
        Arc::clone(&source),
        ownership,
        pool_cache,
        config.history_limit,
    ));

    let mut state = AppState::new(engine, &config.auth_user_header);
    if let Some(library) = library {
        state = state.with_library_seeds(Arc::new(LibrarySeeder::new(Arc::new(library), source)));
    }
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        region = %config.audible_region,
        ownership_checks = config.abs_enabled(),
        library_seeds = config.abs_configured(),
        "Server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
