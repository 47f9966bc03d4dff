// Main entry point for the API server.

use std::sync::Arc;

use anyhow::{Context, Result};
use credit_core::kernel::bus::NatsBus;
use credit_core::kernel::AppKernel;
use credit_core::realtime::{ConnectionManager, NotificationBridge};
use credit_core::server::build_app;
use credit_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.tracing_enabled
        && config.tracing_exporter == credit_core::config::TracingExporter::Otlp
    {
        tracing::warn!("TRACING_EXPORTER=otlp requested but this build ships the console exporter");
    }

    tracing::info!("Starting credit application API");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;
    tracing::info!("Bus connected");

    let port = config.port;
    let nats_url = config.nats_url.clone();
    let kernel = AppKernel::new(config, pool, Arc::new(NatsBus::new(nats)));
    kernel.ensure_triggers_installed().await?;

    // Bridge: bus messages → live WebSocket clients. Long-lived task,
    // cancelled at shutdown.
    let manager = ConnectionManager::new();
    let shutdown = CancellationToken::new();
    let bridge = NotificationBridge::new(nats_url, manager.clone());
    let bridge_handle = tokio::spawn(bridge.run(shutdown.clone()));

    let app = build_app(kernel, manager);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    bridge_handle.await.ok();

    tracing::info!("Server stopped");
    Ok(())
}
