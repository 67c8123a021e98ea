use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod domain;
mod health;
mod messaging;
mod metrics;
mod service;
mod store;
mod utils;

use cache::LruCache;
use config::Config;
use health::{HealthRegistry, HealthStatus};
use messaging::{OrderConsumer, OrderIngestor};
use metrics::Metrics;
use service::OrderService;
use store::PgOrderRepository;
use utils::RetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug")),
        )
        .init();

    tracing::info!("Starting order ingest service");

    let config = Config::load()?;

    // === 1. Metrics and health ===
    let metrics = Arc::new(Metrics::new()?);
    let health = Arc::new(HealthRegistry::new());

    // === 2. Store ===
    tracing::info!("Connecting to PostgreSQL");
    let pool = match store::connect(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            health.update(health::DATABASE, HealthStatus::Unhealthy(e.to_string()), None);
            return Err(e.into());
        }
    };
    health.update(health::DATABASE, HealthStatus::Healthy, None);

    // === 3. Cache, service and pipeline ===
    let repository = Arc::new(PgOrderRepository::new(pool.clone()));
    let cache = Arc::new(LruCache::new(config.cache.capacity, config.cache.ttl()));
    let service = Arc::new(OrderService::new(
        repository,
        cache,
        metrics.clone(),
        config.cache.warm_up_limit,
    ));
    let ingestor = Arc::new(OrderIngestor::new(
        service.clone(),
        metrics.clone(),
        RetryConfig::default(),
    ));

    let shutdown = CancellationToken::new();

    // === 4. Warm-up, alongside the consumer ===
    let warm_up = {
        let service = service.clone();
        let health = health.clone();
        tokio::spawn(async move {
            match service.warm_up_cache().await {
                Ok(count) => health.update(
                    health::WARM_UP,
                    HealthStatus::Healthy,
                    Some(format!("{} orders cached", count)),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "Cache warm-up failed, serving cold");
                    health.update(health::WARM_UP, HealthStatus::Degraded(e.to_string()), None);
                }
            }
        })
    };

    // === 5. Stream consumer ===
    let consumer = OrderConsumer::new(&config.kafka, ingestor, health.clone(), metrics.clone())?;
    let consumer_task = tokio::spawn(consumer.run(shutdown.clone()));

    // === 6. HTTP server, once the cache is warm ===
    warm_up.await?;

    let server = api::server(
        api::AppState {
            service,
            metrics,
            health,
        },
        &config.http_addr,
    )?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tracing::info!(addr = %config.http_addr, "Service ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    // === 7. Shutdown ===
    tracing::info!("Shutting down");
    shutdown.cancel();
    server_handle.stop(true).await;

    consumer_task.await?;
    if let Err(e) = server_task.await? {
        tracing::error!(error = %e, "HTTP server exited with error");
    }
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
