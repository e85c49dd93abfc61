use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_lookup::cache::{MemoryCache, OrderCache, RedisCache, DEFAULT_KEY_PREFIX};
use order_lookup::config::{CacheBackend, Config};
use order_lookup::messaging::{ConsumerConfig, OrderConsumer, OrderIngestor};
use order_lookup::metrics::{self, AppState, Metrics};
use order_lookup::query::OrderService;
use order_lookup::storage::{OrderStore, PgOrderStore};
use order_lookup::utils::{retry_with_backoff, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_lookup=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order lookup service");

    // === 1. Persistence store ===
    let pg = retry_with_backoff(&RetryConfig::startup(), "postgres_connect", |_attempt| {
        PgOrderStore::connect(&config.database_url, config.database_max_connections)
    })
    .await?;
    pg.migrate().await?;
    let store: Arc<dyn OrderStore> = Arc::new(pg);

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);

    // === 3. Cache, warmed from the store before any traffic ===
    let cache: Arc<dyn OrderCache> = match &config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Redis { url } => {
            let redis = retry_with_backoff(&RetryConfig::startup(), "redis_connect", |_attempt| {
                RedisCache::connect(url, DEFAULT_KEY_PREFIX)
            })
            .await?;
            Arc::new(redis)
        }
    };

    let warmed = cache
        .warmup(store.as_ref())
        .await
        .context("cache warm-up failed")?;
    metrics.warmup_orders.set(warmed as i64);
    tracing::info!(orders = warmed, "🔥 Cache warmed");

    // === 4. Consumer ===
    let ingestor = Arc::new(OrderIngestor::new(store.clone(), cache.clone(), metrics.clone()));
    let consumer = OrderConsumer::connect(
        ConsumerConfig {
            brokers: config.kafka_brokers.clone(),
            topic: config.orders_topic.clone(),
            durable_name: config.durable_name.clone(),
            ack_wait: config.ack_wait,
        },
        ingestor,
        metrics.clone(),
    )
    .await?;

    // === 5. HTTP ===
    let state = AppState {
        orders: Arc::new(OrderService::new(cache, store, metrics.clone())),
        registry: metrics.registry().clone(),
        consumer_state: consumer.subscribe_state(),
    };
    let server = metrics::start_http_server(state, config.http_port, config.shutdown_grace)?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // === 6. Consume until told to stop ===
    let shutdown = CancellationToken::new();
    let mut consumer_task = tokio::spawn(consumer.run(shutdown.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
        }
        _ = &mut consumer_task => {
            tracing::warn!("Order consumer stopped on its own, shutting down");
        }
    }

    // Consumer first, so in-flight messages finish before the HTTP layer goes.
    shutdown.cancel();
    if !consumer_task.is_finished() {
        match tokio::time::timeout(config.shutdown_grace, consumer_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Order consumer task failed"),
            Err(_) => tracing::warn!("Order consumer did not drain within the grace period"),
        }
    }

    if tokio::time::timeout(config.shutdown_grace, server_handle.stop(true))
        .await
        .is_err()
    {
        tracing::warn!("HTTP server did not stop within the grace period");
        server_task.abort();
    } else if let Ok(Err(e)) = server_task.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    tracing::info!("👋 Order lookup service stopped");
    Ok(())
}
