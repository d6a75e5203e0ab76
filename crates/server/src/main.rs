//! Orderflow Server - order ingestion and read API.
//!
//! This binary serves the order lookup API on port 8080.
//!
//! # Architecture
//!
//! - NATS `JetStream` durable consumer delivering order messages
//! - `PostgreSQL` as the durable store (four relations per order)
//! - In-memory read cache rebuilt from the database on startup
//! - Axum read API served only from the cache
//!
//! # Startup order
//!
//! 1. Connect to the database
//! 2. Restore the cache from every stored order (failure aborts startup)
//! 3. Bind the durable subscription and start consuming
//! 4. Serve HTTP
//!
//! The process exits with status 1 if the subscription ends before a
//! shutdown signal, so a supervisor can restart it.
//!
//! Migrations are NOT run automatically. Apply them with:
//! `cargo run -p orderflow-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use orderflow_server::cache::OrderCache;
use orderflow_server::config::ServerConfig;
use orderflow_server::consumer::OrderConsumer;
use orderflow_server::db::{self, OrderRepository};
use orderflow_server::lifecycle::{self, StopReason};
use orderflow_server::routes;
use orderflow_server::service::OrderService;
use orderflow_server::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderflow_server=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let service = Arc::new(OrderService::new(
        OrderRepository::new(pool.clone()),
        OrderCache::new(),
    ));

    // The API must not answer before every stored order is cached
    service
        .restore()
        .await
        .expect("Failed to restore order cache from database");

    let consumer = OrderConsumer::subscribe(&config.stream, Arc::clone(&service))
        .await
        .expect("Failed to subscribe to order stream");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer_task = tokio::spawn(consumer.run(shutdown_rx.clone()));

    let state = AppState::new(config, pool, service.query());
    let addr = state.config().socket_addr();

    let app = routes::router(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    tracing::info!("orderflow listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // Stop on a signal, or as soon as the subscription ends by itself
    let stop = lifecycle::wait_for_stop(&mut consumer_task, lifecycle::shutdown_signal()).await;
    let exited_early = match stop {
        StopReason::Signal => false,
        StopReason::ConsumerExited(result) => {
            lifecycle::log_consumer_exit(&result, false);
            true
        }
    };

    // Stop pulling new messages and accepting requests
    let _ = shutdown_tx.send(true);
    server
        .await
        .expect("Server task panicked")
        .expect("Server error");

    if exited_early {
        drop(sentry_guard);
        std::process::exit(1);
    }
    // In-flight handlers finish on their own tasks
    lifecycle::log_consumer_exit(&consumer_task.await, true);
}
