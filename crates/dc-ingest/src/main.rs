//! # DoorCam Ingest
//!
//! Receives images that devices publish over MQTT in base64 chunks,
//! reassembles them in memory and hands each complete image to S3 and
//! Postgres. A small HTTP API exposes health, in-flight transfers and
//! stored images.

mod api;
mod services;
mod transfer;
mod workers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use services::handoff::StorageHandoff;
use transfer::engine::ReassemblyEngine;
use transfer::registry::SessionRegistry;
use transfer::router::TopicRouter;

pub type Engine = ReassemblyEngine<StorageHandoff>;

/// Shared application state available to handlers and workers.
pub struct AppState {
    pub db: sqlx::PgPool,
    /// S3 client configured with the public endpoint for browser-facing pre-signed URLs.
    pub s3_public: aws_sdk_s3::Client,
    pub config: dc_common::AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub engine: Arc<Engine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Load configuration
    let config = dc_common::AppConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting DoorCam ingest...");

    // Connect to PostgreSQL
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    // Run migrations
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations")).await?;
    migrator.run(&db).await?;
    tracing::info!("Database migrations applied");

    // Initialize S3/MinIO clients
    let s3 = services::s3::init_client(&config.s3, &config.s3.endpoint, "dc-ingest");
    let s3_public =
        services::s3::init_client(&config.s3, config.s3.public_endpoint(), "dc-ingest-public");
    services::s3::ensure_bucket(&s3, &config.s3.bucket).await?;
    tracing::info!("S3/MinIO connected, bucket ready");

    // Build the reassembly engine
    let registry = Arc::new(SessionRegistry::new(Duration::from_secs(
        config.transfers.tombstone_secs,
    )));
    let handoff = StorageHandoff {
        s3,
        db: db.clone(),
        bucket: config.s3.bucket.clone(),
        folder: config.s3.folder.clone(),
    };
    let engine = Arc::new(ReassemblyEngine::new(
        TopicRouter::new(config.mqtt.namespace.clone()),
        registry.clone(),
        handoff,
        config.transfers.handoff_failure_policy,
        config.transfers.dead_letter_capacity,
    ));
    tracing::info!(
        policy = ?config.transfers.handoff_failure_policy,
        "Reassembly engine ready"
    );

    // Build shared state
    let state = Arc::new(AppState {
        db,
        s3_public,
        config: config.clone(),
        registry,
        engine: engine.clone(),
    });

    // Start MQTT subscriber
    let subscriber = services::mqtt::start(&config.mqtt, engine)?;

    // Start background workers
    let worker_handles = workers::start_all_workers(state.clone());
    tracing::info!("Background workers started");

    // Build router
    let app = Router::new()
        .nest("/api", api::router(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.api_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    subscriber.abort();
    for handle in worker_handles {
        handle.abort();
    }

    let in_flight = state.registry.len();
    let dead_letters = state.engine.dead_letters().len();
    if in_flight > 0 || dead_letters > 0 {
        tracing::warn!(in_flight, dead_letters, "Shutting down with unfinished transfers");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
