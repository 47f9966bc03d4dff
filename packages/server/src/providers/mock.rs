//! Deterministic mock banking providers.
//!
//! Data derives from a cheap hash of the document digits, so repeated
//! evaluations of the same applicant see the same banking profile. Each
//! country gets its own provider name and score band.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map};

use crate::common::errors::AppError;
use crate::common::types::Country;
use crate::domain::risk::BankingData;

use super::BankingProvider;

/// Mock provider seeded from the document.
pub struct MockBankingProvider {
    country: Country,
    name: String,
}

impl MockBankingProvider {
    pub fn new(country: Country) -> Self {
        let name = match country {
            Country::ES => "Banco de España Mock",
            Country::PT => "Banco de Portugal Mock",
            Country::IT => "Banca d'Italia Mock",
            Country::MX => "Buró de Crédito Mock",
            Country::CO => "DataCrédito Mock",
            Country::BR => "Serasa Mock",
        };
        MockBankingProvider {
            country,
            name: name.to_string(),
        }
    }

    /// Deterministic seed: sum of the normalized document's byte values.
    fn seed(document: &str) -> u32 {
        document
            .bytes()
            .filter(|b| *b != b' ' && *b != b'-' && *b != b'.')
            .map(u32::from)
            .sum()
    }

    fn score_band(&self) -> (i32, i32) {
        match self.country {
            // Bureau scales differ per country; bands stay inside 300-850.
            Country::BR => (450, 850),
            Country::MX => (500, 850),
            _ => (600, 850),
        }
    }
}

#[async_trait]
impl BankingProvider for MockBankingProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn fetch_banking_data(
        &self,
        document: &str,
        _full_name: &str,
    ) -> Result<BankingData, AppError> {
        // Simulated upstream latency.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let seed = Self::seed(document);
        let (min_score, max_score) = self.score_band();
        let credit_score = min_score + (seed % (max_score - min_score) as u32) as i32;

        let total_debt = Decimal::from(seed % 30_000);
        let monthly_obligations = total_debt / Decimal::from(36);

        let mut additional_data = Map::new();
        additional_data.insert(
            "account_age_months".to_string(),
            json!((seed % 120) as i64),
        );
        additional_data.insert("data_source".to_string(), json!("mock"));
        additional_data.insert("country".to_string(), json!(self.country.as_str()));

        Ok(BankingData {
            provider_name: self.name.clone(),
            account_status: "active".to_string(),
            credit_score: Some(credit_score),
            total_debt: Some(total_debt),
            monthly_obligations: Some(monthly_obligations),
            has_defaults: seed % 10 == 0,
            additional_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_document_yields_same_profile() {
        let provider = MockBankingProvider::new(Country::ES);
        let a = provider
            .fetch_banking_data("12345678Z", "Juan Pérez García")
            .await
            .unwrap();
        let b = provider
            .fetch_banking_data("12345678Z", "Juan Pérez García")
            .await
            .unwrap();
        assert_eq!(a.credit_score, b.credit_score);
        assert_eq!(a.total_debt, b.total_debt);
        assert_eq!(a.has_defaults, b.has_defaults);
    }

    #[tokio::test]
    async fn separators_do_not_change_the_seed() {
        let provider = MockBankingProvider::new(Country::BR);
        let bare = provider.fetch_banking_data("12345678909", "x").await.unwrap();
        let dotted = provider
            .fetch_banking_data("123.456.789-09", "x")
            .await
            .unwrap();
        assert_eq!(bare.credit_score, dotted.credit_score);
    }

    #[tokio::test]
    async fn scores_stay_inside_the_country_band() {
        for country in Country::all() {
            let provider = MockBankingProvider::new(country);
            let data = provider.fetch_banking_data("98765432", "x").await.unwrap();
            let score = data.credit_score.unwrap();
            assert!((300..=850).contains(&score), "{country}: {score}");
        }
    }
}
