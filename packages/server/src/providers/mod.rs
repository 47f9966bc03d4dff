//! Banking data providers.
//!
//! A provider fetches banking data for one country. The trait is the seam
//! real integrations plug into; the shipped implementations are
//! deterministic mocks seeded from the document so the same applicant
//! always resolves to the same profile.

mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::errors::AppError;
use crate::common::types::Country;
use crate::domain::risk::BankingData;

pub use mock::MockBankingProvider;

/// A source of banking data for one country.
///
/// Implementations may fail with `ExternalService`, `NetworkTimeout` or any
/// `Recoverable` error; those count toward the circuit breaker. Anything
/// else is treated as a programming error and passed through untallied.
#[async_trait]
pub trait BankingProvider: Send + Sync {
    /// Provider display name, used in circuit keys and stored payloads.
    fn provider_name(&self) -> &str;

    /// Fetch banking data for an applicant.
    async fn fetch_banking_data(
        &self,
        document: &str,
        full_name: &str,
    ) -> Result<BankingData, AppError>;
}

/// The deterministic mock provider for a country.
pub fn mock_provider_for(country: Country) -> Arc<dyn BankingProvider> {
    Arc::new(MockBankingProvider::new(country))
}
