//! Lease-based distributed locks.
//!
//! A lock is a row in `process_locks` with an expiry. Acquisition steals
//! expired leases atomically; a crashed holder's lock frees itself when
//! the lease runs out, so no cleanup pass is needed.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::common::errors::AppError;

/// Safety timeout on per-application processing locks.
pub const PROCESS_LOCK_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct LeaseLock {
    pool: PgPool,
    holder: String,
}

impl LeaseLock {
    pub fn new(pool: PgPool) -> Self {
        LeaseLock {
            pool,
            holder: format!("holder-{}", Uuid::new_v4()),
        }
    }

    pub fn with_holder(pool: PgPool, holder: impl Into<String>) -> Self {
        LeaseLock {
            pool,
            holder: holder.into(),
        }
    }

    /// Try to take the lock. Returns false when another holder owns an
    /// unexpired lease.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO process_locks (key, holder, locked_until)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET holder = EXCLUDED.holder,
                locked_until = EXCLUDED.locked_until
            WHERE process_locks.locked_until < now()
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(&self.holder)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }

    /// Release the lock if this instance still holds it.
    pub async fn release(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM process_locks WHERE key = $1 AND holder = $2")
            .bind(key)
            .bind(&self.holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

/// Lock key for per-application mutual exclusion.
pub fn process_lock_key(application_id: Uuid) -> String {
    format!("process:{application_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            process_lock_key(id),
            "process:00000000-0000-0000-0000-000000000000"
        );
    }
}
