//! Circuit breaker behavior against a scripted provider, mirroring how a
//! run of provider outages plays out for one (country, provider) pair.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credit_core::common::errors::AppError;
use credit_core::common::types::Country;
use credit_core::domain::risk::BankingData;
use credit_core::providers::BankingProvider;
use credit_core::resilience::{CircuitBreakerRegistry, CircuitState};
use serde_json::Map;

const TIMEOUT: Duration = Duration::from_secs(30);
const THRESHOLD: u32 = 5;
const RECOVERY: Duration = Duration::from_secs(60);

/// Provider that fails a set number of times, then succeeds.
struct FlakyProvider {
    calls: AtomicU32,
    failures_before_recovery: u32,
}

impl FlakyProvider {
    fn new(failures_before_recovery: u32) -> Self {
        FlakyProvider {
            calls: AtomicU32::new(0),
            failures_before_recovery,
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BankingProvider for FlakyProvider {
    fn provider_name(&self) -> &str {
        "Flaky Provider"
    }

    async fn fetch_banking_data(
        &self,
        _document: &str,
        _full_name: &str,
    ) -> Result<BankingData, AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_recovery {
            return Err(AppError::ExternalService("provider down".into()));
        }
        Ok(BankingData {
            provider_name: "Flaky Provider".into(),
            account_status: "active".into(),
            credit_score: Some(700),
            total_debt: None,
            monthly_obligations: None,
            has_defaults: false,
            additional_data: Map::new(),
        })
    }
}

#[tokio::test]
async fn repeated_provider_failures_trip_the_circuit() {
    let registry = CircuitBreakerRegistry::new(THRESHOLD, RECOVERY);
    let provider = Arc::new(FlakyProvider::new(u32::MAX));
    let breaker = registry.breaker(Country::BR, provider.provider_name());

    for _ in 0..THRESHOLD {
        let result = breaker
            .call(TIMEOUT, provider.fetch_banking_data("12345678909", "x"))
            .await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(provider.call_count(), THRESHOLD);

    // The sixth call fails fast without reaching the provider.
    let result = breaker
        .call(TIMEOUT, provider.fetch_banking_data("12345678909", "x"))
        .await;
    assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    assert_eq!(provider.call_count(), THRESHOLD);

    // The failure that lands in the DLQ is flagged for the retry
    // scheduler.
    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.error_type(), "ProviderUnavailableError");
}

#[tokio::test(start_paused = true)]
async fn recovered_provider_closes_the_circuit_after_probe() {
    let registry = CircuitBreakerRegistry::new(THRESHOLD, RECOVERY);
    let provider = Arc::new(FlakyProvider::new(THRESHOLD));
    let breaker = registry.breaker(Country::BR, provider.provider_name());

    for _ in 0..THRESHOLD {
        let _ = breaker
            .call(TIMEOUT, provider.fetch_banking_data("12345678909", "x"))
            .await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(RECOVERY).await;

    // One probe is admitted; the provider has recovered, so it closes.
    let result = breaker
        .call(TIMEOUT, provider.fetch_banking_data("12345678909", "x"))
        .await;
    assert!(result.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn breakers_are_isolated_per_country() {
    let registry = CircuitBreakerRegistry::new(THRESHOLD, RECOVERY);
    let provider = Arc::new(FlakyProvider::new(u32::MAX));

    let br_breaker = registry.breaker(Country::BR, provider.provider_name());
    for _ in 0..THRESHOLD {
        let _ = br_breaker
            .call(TIMEOUT, provider.fetch_banking_data("12345678909", "x"))
            .await;
    }
    assert_eq!(br_breaker.state(), CircuitState::Open);

    let es_breaker = registry.breaker(Country::ES, provider.provider_name());
    assert_eq!(es_breaker.state(), CircuitState::Closed);
}
