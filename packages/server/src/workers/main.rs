// Worker process: job worker pool + scheduled tasks.

use std::sync::Arc;

use anyhow::{Context, Result};
use credit_core::kernel::bus::NatsBus;
use credit_core::kernel::jobs::{JobWorker, JobWorkerConfig, PROCESS_CREDIT_APPLICATION};
use credit_core::kernel::AppKernel;
use credit_core::workers::{start_scheduler, PipelineHooks, ProcessCreditApplicationHandler};
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

    tracing::info!("Starting credit evaluation worker");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;

    let kernel = AppKernel::new(config, pool, Arc::new(NatsBus::new(nats)));
    kernel.ensure_triggers_installed().await?;

    let mut scheduler = start_scheduler(kernel.clone()).await?;

    let worker_config = JobWorkerConfig {
        max_jobs: kernel.config.worker_max_jobs,
        batch_size: kernel.config.worker_max_jobs as i64,
        job_timeout: kernel.config.job_timeout,
        ..Default::default()
    };
    let worker = Arc::new(
        JobWorker::new(
            kernel.queue.clone(),
            Arc::new(PipelineHooks::new(kernel.clone())),
            worker_config,
        )
        .register(
            PROCESS_CREDIT_APPLICATION,
            Arc::new(ProcessCreditApplicationHandler::new(kernel.clone())),
        ),
    );

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    let _ = worker_handle.await;
    scheduler.shutdown().await.ok();

    tracing::info!("Worker stopped");
    Ok(())
}
