use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod domain;
mod health;
mod messaging;
mod metrics;
mod store;
mod utils;

#[cfg(test)]
mod test_utils;

use cache::OrderCache;
use config::{Config, KafkaConfig};
use domain::order::OrderService;
use messaging::{admin, NotificationDispatcher, OrderPublisher, RedpandaClient};
use metrics::Metrics;
use store::PgOrderRepository;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, override with RUST_LOG
    // Example: RUST_LOG=order_service=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order service");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    // === 1. Postgres ===
    tracing::info!(
        host = %config.database.host,
        port = config.database.port,
        database = %config.database.name,
        "Connecting to Postgres..."
    );
    let pool = store::postgres::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    store::postgres::run_migrations(&pool)
        .await
        .context("failed to apply migrations")?;
    tracing::info!("✅ Database ready");

    let repository = Arc::new(PgOrderRepository::new(pool.clone()));

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        metric_families = metrics.registry().gather().len(),
        "📊 Metrics registry created"
    );

    // === 3. Notification publisher (optional) ===
    let dispatcher = Arc::new(build_dispatcher(&config.kafka, metrics.clone()).await);

    // === 4. Cache warm-up ===
    let cache = Arc::new(OrderCache::new());
    let service = web::Data::new(OrderService::new(
        repository,
        cache,
        dispatcher.clone(),
        metrics.clone(),
        config.store_timeout,
    ));

    match service.warm_up_cache().await {
        Ok(count) => tracing::info!(count, "✅ Cache warmed up"),
        Err(e) => tracing::warn!(error = %e, "Cache warm-up failed, starting with an empty cache"),
    }

    // === 5. HTTP server ===
    let bind = (config.http.host.clone(), config.http.port);
    tracing::info!(host = %bind.0, port = bind.1, "🌐 Starting HTTP server");

    let metrics_data = web::Data::from(metrics.clone());
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(service.clone())
            .app_data(metrics_data.clone())
            .configure(api::configure)
            .configure(metrics::configure)
    })
    .shutdown_timeout(config.shutdown_timeout.as_secs())
    .bind(bind)
    .context("failed to bind HTTP listener")?
    .run()
    .await?;

    // === 6. Shutdown ===
    tracing::info!("HTTP server stopped, draining order notifications");
    dispatcher.shutdown(config.shutdown_timeout).await;
    pool.close().await;

    tracing::info!("👋 Order service stopped");
    Ok(())
}

/// Connect to the broker and make sure the topic exists. Publishing is
/// disabled, not fatal, when the broker can't be reached in time.
async fn build_dispatcher(config: &KafkaConfig, metrics: Arc<Metrics>) -> NotificationDispatcher {
    if !config.enabled {
        tracing::info!("Kafka disabled, order notifications will not be published");
        return NotificationDispatcher::disabled(metrics);
    }

    tracing::info!(brokers = ?config.brokers, topic = %config.topic, "Waiting for Kafka...");
    match admin::wait_for_broker(config, config.startup_timeout).await {
        Ok(brokers) => tracing::info!(brokers, "✅ Kafka is ready"),
        Err(e) => {
            tracing::error!(error = %e, "Kafka unavailable, order notifications disabled");
            return NotificationDispatcher::disabled(metrics);
        }
    }

    if let Err(e) = admin::ensure_topic(config).await {
        tracing::warn!(topic = %config.topic, error = %e, "Failed to create topic");
    }

    match RedpandaClient::new(config) {
        Ok(client) => {
            tracing::info!(topic = %client.topic(), "📡 Kafka producer created");
            let publisher: Arc<dyn OrderPublisher> = Arc::new(client.with_metrics(metrics.clone()));
            NotificationDispatcher::new(publisher, config.publish_timeout, metrics)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Kafka producer, order notifications disabled");
            NotificationDispatcher::disabled(metrics)
        }
    }
}
