//! AppKernel: the process-wide dependency bundle.
//!
//! Holds the database pool, bus publisher, work queue, cipher and circuit
//! breaker registry. Constructed once at process start and injected
//! everywhere; business code never reaches for globals.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::kernel::bus::BusPublisher;
use crate::kernel::cache::{Cache, InMemoryCache};
use crate::kernel::cipher::{Cipher, DocumentDigest};
use crate::kernel::jobs::{Backoff, PostgresQueue};
use crate::kernel::locks::LeaseLock;
use crate::resilience::CircuitBreakerRegistry;

#[derive(Clone)]
pub struct AppKernel {
    pub db_pool: PgPool,
    pub bus: Arc<dyn BusPublisher>,
    pub queue: Arc<PostgresQueue>,
    pub cipher: Cipher,
    pub document_digest: DocumentDigest,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub locks: LeaseLock,
    pub cache: Arc<dyn Cache>,
    pub config: Arc<Config>,
}

impl AppKernel {
    pub fn new(config: Config, db_pool: PgPool, bus: Arc<dyn BusPublisher>) -> Self {
        let queue = Arc::new(PostgresQueue::new(
            db_pool.clone(),
            config.job_max_tries,
            Backoff::new(config.retry_backoff_base, config.retry_backoff_max),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker_failure_threshold,
            config.circuit_breaker_recovery_timeout,
        ));
        let cipher = Cipher::new(config.encryption_key.clone());
        let document_digest = DocumentDigest::new(&config.encryption_key);
        let locks = LeaseLock::new(db_pool.clone());

        AppKernel {
            db_pool,
            bus,
            queue,
            cipher,
            document_digest,
            breakers,
            locks,
            cache: Arc::new(InMemoryCache::new()),
            config: Arc::new(config),
        }
    }

    /// Swap the cache backend (tests use this to pin behavior).
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Re-assert the store-side triggers at startup. Migrations install
    /// them; this guards drifted databases.
    pub async fn ensure_triggers_installed(&self) -> anyhow::Result<()> {
        let installed: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*) FROM pg_trigger
            WHERE tgname IN ('trg_audit_application_status', 'trg_enqueue_application_processing')
            "#,
        )
        .fetch_one(&self.db_pool)
        .await?;

        anyhow::ensure!(
            installed == 2,
            "store triggers missing ({installed}/2 installed); run migrations"
        );
        Ok(())
    }
}
