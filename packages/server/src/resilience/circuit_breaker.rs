//! Circuit breaker for banking provider calls.
//!
//! One circuit per (country, provider_name). Only the retryable error
//! classes advance the circuit — a provider bug that throws the same
//! programming error forever must not open it. While OPEN, calls fail
//! fast with `ProviderUnavailable` and never reach the provider; after
//! `recovery_timeout` a single probe is admitted (HALF_OPEN).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::common::errors::AppError;
use crate::common::types::Country;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Internal counters, exposed for health output and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    stats: BreakerStats,
}

pub struct CircuitBreaker {
    country: Country,
    provider_name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        country: Country,
        provider_name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Self {
        CircuitBreaker {
            country,
            provider_name: provider_name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                stats: BreakerStats::default(),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admission control. OPEN circuits reject until the recovery timeout
    /// elapses, then admit exactly one probe.
    fn try_acquire(&self) -> Result<(), AppError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(
                        country = %self.country,
                        provider = %self.provider_name,
                        "circuit breaker half-open, admitting probe"
                    );
                    Ok(())
                } else {
                    Err(self.unavailable())
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(self.unavailable())
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn unavailable(&self) -> AppError {
        AppError::ProviderUnavailable(format!(
            "circuit open for provider '{}' ({})",
            self.provider_name, self.country
        ))
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.stats.successes += 1;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.state != CircuitState::Closed {
            tracing::info!(
                country = %self.country,
                provider = %self.provider_name,
                "circuit breaker closed after successful probe"
            );
        }
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    fn record_failure(&self, timed_out: bool) {
        let mut inner = self.lock();
        inner.stats.failures += 1;
        if timed_out {
            inner.stats.timeouts += 1;
        }
        inner.probe_in_flight = false;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        country = %self.country,
                        provider = %self.provider_name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run a provider call through the breaker with a hard timeout.
    ///
    /// Timeout expiry surfaces as `NetworkTimeout` and counts toward the
    /// breaker. Errors outside the retryable set pass through untallied.
    pub async fn call<F, T>(&self, timeout: Duration, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.try_acquire()?;

        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                if err.counts_toward_circuit() {
                    self.record_failure(false);
                } else {
                    // Programming error: reset nothing, count nothing.
                    let mut inner = self.lock();
                    inner.probe_in_flight = false;
                }
                Err(err)
            }
            Err(_) => {
                self.record_failure(true);
                Err(AppError::NetworkTimeout(format!(
                    "provider '{}' ({}) did not answer within {:?}",
                    self.provider_name, self.country, timeout
                )))
            }
        }
    }
}

/// Process-wide registry of circuits keyed by (country, provider name).
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: RwLock<HashMap<(Country, String), Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreakerRegistry {
            failure_threshold,
            recovery_timeout,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, country: Country, provider_name: &str) -> Arc<CircuitBreaker> {
        if let Some(found) = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(country, provider_name.to_string()))
        {
            return found.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry((country, provider_name.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    country,
                    provider_name,
                    self.failure_threshold,
                    self.recovery_timeout,
                ))
            })
            .clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        CircuitBreakerRegistry::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            Country::BR,
            "Serasa Mock",
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RECOVERY_TIMEOUT,
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), AppError> {
        b.call(TIMEOUT, async {
            Err::<(), _>(AppError::ExternalService("boom".into()))
        })
        .await
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let b = breaker();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            assert!(fail(&b).await.is_err());
        }
        assert_eq!(b.state(), CircuitState::Open);

        // Next call fails fast without invoking the provider.
        let mut invoked = false;
        let result = b
            .call(TIMEOUT, async {
                invoked = true;
                Ok::<_, AppError>(())
            })
            .await;
        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        let b = breaker();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD - 1 {
            assert!(fail(&b).await.is_err());
        }
        b.call(TIMEOUT, async { Ok::<_, AppError>(()) })
            .await
            .unwrap();
        assert!(fail(&b).await.is_err());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_timeout_admits_one_probe() {
        let b = breaker();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            assert!(fail(&b).await.is_err());
        }
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(DEFAULT_RECOVERY_TIMEOUT).await;

        // Probe succeeds: circuit closes.
        b.call(TIMEOUT, async { Ok::<_, AppError>(()) })
            .await
            .unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_the_circuit() {
        let b = breaker();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            assert!(fail(&b).await.is_err());
        }
        tokio::time::advance(DEFAULT_RECOVERY_TIMEOUT).await;

        assert!(fail(&b).await.is_err());
        assert_eq!(b.state(), CircuitState::Open);

        // Still open: fail fast again before another recovery window.
        let result = b.call(TIMEOUT, async { Ok::<_, AppError>(()) }).await;
        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn programming_errors_do_not_advance_the_circuit() {
        let b = breaker();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD * 2 {
            let result = b
                .call(TIMEOUT, async {
                    Err::<(), _>(AppError::Internal(anyhow::anyhow!("null dereference")))
                })
                .await;
            assert!(matches!(result, Err(AppError::Internal(_))));
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_toward_the_breaker() {
        let b = breaker();
        let result = b
            .call(Duration::from_secs(1), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await;
        assert!(matches!(result, Err(AppError::NetworkTimeout(_))));
        assert_eq!(b.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn registry_hands_out_one_breaker_per_key() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.breaker(Country::BR, "Serasa Mock");
        let b = registry.breaker(Country::BR, "Serasa Mock");
        let c = registry.breaker(Country::ES, "Serasa Mock");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
