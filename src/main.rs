use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stylemate_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, CacheWriterHandle, PgStore, RedisCacheBackend},
    services::{
        providers::OpenMeteoProvider, CacheBackend, CircuitBreaker, MemoryCacheBackend,
        OutfitCombiner, PersistenceQueue, PreferenceStore, QueueSettings, ResultCache, Scorer,
        StylistService, StylistSettings, WeatherGateway,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stylemate_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Invalid weights or timeouts stop startup here
    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let (persistence, persistence_worker) = PersistenceQueue::spawn(
        store.clone(),
        store.clone(),
        QueueSettings {
            capacity: config.persistence_queue_capacity,
            flush_delay: config.persistence_flush_delay(),
            max_retries: config.max_retries,
        },
    );

    let (cache_backend, cache_writer): (Arc<dyn CacheBackend>, Option<CacheWriterHandle>) =
        match &config.redis_url {
            Some(redis_url) => {
                let client = create_redis_client(redis_url)?;
                let (backend, handle) = RedisCacheBackend::new(client);
                tracing::info!("Using Redis result cache");
                (Arc::new(backend), Some(handle))
            }
            None => {
                tracing::info!("REDIS_URL not set, using in-process result cache");
                (Arc::new(MemoryCacheBackend::new()), None)
            }
        };

    let provider = Arc::new(OpenMeteoProvider::new(config.weather_api_url.clone())?);
    let weather = Arc::new(WeatherGateway::new(
        provider,
        CircuitBreaker::new("open-meteo", config.breaker_config()),
        config.weather_cache_ttl(),
        config.max_retries,
    ));

    let preferences = Arc::new(PreferenceStore::new(
        store.clone(),
        persistence.clone(),
        config.branch_timeout(),
    ));
    let combiner = Arc::new(OutfitCombiner::new(
        Scorer::new(config.scoring_weights(), config.weather_thresholds()),
        config.combiner_config(),
    ));
    let cache = Arc::new(ResultCache::new(
        cache_backend,
        config.cache_ttl(),
        config.latency_target(),
    ));

    let stylist = StylistService::new(
        store.clone(),
        store,
        weather,
        preferences,
        combiner,
        cache,
        StylistSettings::from_config(&config),
    )
    .with_persistence(persistence);

    let app = create_router(AppState::new(Arc::new(stylist)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    persistence_worker.shutdown().await;
    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, flushing background writers");
}
