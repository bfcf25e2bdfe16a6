use kafka_control_plane::{
    api::{create_router, AppState},
    cache::{create_client, RedisSummaryCache, SummaryCache},
    config::{Config, StorageBackend},
    db::{create_pool, run_migrations, MemoryStore, PgStore, Repositories},
    observability::init_tracing,
    workflow::HttpWorkflowRunner,
};
use std::{net::SocketAddr, sync::Arc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize tracing/logging
    init_tracing(&config.observability);

    tracing::info!("Starting Kafka control plane");
    tracing::info!("Configuration loaded: {:?}", config.server);

    let repos = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_pool = create_pool(&config.database).await?;
            tracing::info!("Database connection pool created");

            run_migrations(&db_pool).await?;
            tracing::info!("Database migrations completed");

            Repositories::from_store(Arc::new(PgStore::new(db_pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        }
    };

    let cache: Option<Arc<dyn SummaryCache>> = if config.redis.enabled {
        let redis_manager = create_client(&config.redis).await?;
        tracing::info!("Redis connection established");
        Some(Arc::new(RedisSummaryCache::new(
            redis_manager,
            config.redis.summary_ttl_seconds,
        )))
    } else {
        None
    };

    let runner = Arc::new(HttpWorkflowRunner::new(&config.workflow)?);

    let state = AppState::new(&config, repos, runner, cache);
    let app = create_router(state, config.observability.metrics_enabled);

    // Bind server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Kafka control plane is ready to accept requests");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
