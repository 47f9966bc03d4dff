//! Country strategies: per-country document validation and risk rules.
//!
//! Each country is a variant of [`Strategy`]; document formats, checksum
//! rules and lending knobs are implementation details of the country
//! modules. Amounts are `Decimal` end to end; ratios guard against
//! near-zero income by saturating to 100%.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::common::errors::AppError;
use crate::common::types::Country;
use crate::providers::{mock_provider_for, BankingProvider};

use super::risk::{ApprovalRecommendation, BankingData, RiskAssessment, RiskLevel, ValidationResult};

mod brazil;
mod colombia;
mod italy;
mod mexico;
mod portugal;
mod spain;

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;
pub const CRITICAL_THRESHOLD: i64 = 80;
pub const HIGH_THRESHOLD: i64 = 60;
pub const MEDIUM_THRESHOLD: i64 = 40;

/// Score at or above which a bureau score earns a positive adjustment.
pub const GOOD_SCORE_THRESHOLD: i32 = 750;

/// Floor applied to clean approvals so a perfect profile still carries a
/// non-zero score.
pub const CLEAN_PROFILE_FLOOR: i64 = 10;

const BASE_REQUIRED_FIELDS: &[&str] = &[
    "country",
    "full_name",
    "identity_document",
    "requested_amount",
    "monthly_income",
];

/// A country's validator + risk evaluator with its banking provider.
#[derive(Clone)]
pub struct Strategy {
    country: Country,
    provider: Arc<dyn BankingProvider>,
}

impl Strategy {
    pub fn country(&self) -> Country {
        self.country
    }

    pub fn provider(&self) -> &Arc<dyn BankingProvider> {
        &self.provider
    }

    pub fn validate_identity_document(&self, document: &str) -> ValidationResult {
        match self.country {
            Country::ES => spain::validate_dni(document),
            Country::PT => portugal::validate_nif(document),
            Country::IT => italy::validate_codice_fiscale(document),
            Country::MX => mexico::validate_curp(document),
            Country::CO => colombia::validate_cedula(document),
            Country::BR => brazil::validate_cpf(document),
        }
    }

    pub fn apply_business_rules(
        &self,
        requested_amount: Decimal,
        monthly_income: Decimal,
        banking_data: &BankingData,
        country_specific_data: &Map<String, Value>,
    ) -> RiskAssessment {
        match self.country {
            Country::ES => spain::evaluate(requested_amount, monthly_income, banking_data),
            Country::PT => portugal::evaluate(requested_amount, monthly_income, banking_data),
            Country::IT => italy::evaluate(requested_amount, monthly_income, banking_data),
            Country::MX => mexico::evaluate(requested_amount, monthly_income, banking_data),
            Country::CO => colombia::evaluate(requested_amount, monthly_income, banking_data),
            Country::BR => brazil::evaluate(
                requested_amount,
                monthly_income,
                banking_data,
                country_specific_data,
            ),
        }
    }

    pub fn document_type_name(&self) -> &'static str {
        match self.country {
            Country::ES => "DNI",
            Country::PT => "NIF",
            Country::IT => "Codice Fiscale",
            Country::MX => "CURP",
            Country::CO => "Cédula de Ciudadanía",
            Country::BR => "CPF",
        }
    }

    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut fields = BASE_REQUIRED_FIELDS.to_vec();
        if self.country == Country::MX {
            fields.push("state");
        }
        fields
    }
}

/// Resolve a country code to its strategy. When no provider is supplied a
/// deterministic mock provider for that country is injected.
pub fn strategy_for(country: Country, provider: Option<Arc<dyn BankingProvider>>) -> Strategy {
    let provider = provider.unwrap_or_else(|| mock_provider_for(country));
    Strategy { country, provider }
}

/// Resolve a raw country code, failing with a validation error for
/// unsupported countries.
pub fn strategy_for_code(
    code: &str,
    provider: Option<Arc<dyn BankingProvider>>,
) -> Result<Strategy, AppError> {
    let country = Country::parse(code).ok_or_else(|| {
        AppError::Validation(format!(
            "country '{code}' is not supported. Supported countries: ES, PT, IT, MX, CO, BR"
        ))
    })?;
    Ok(strategy_for(country, provider))
}

// ----------------------------------------------------------------------------
// Shared rule helpers
// ----------------------------------------------------------------------------

fn percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    (numerator / denominator) * Decimal::from(100)
}

/// Debt-to-income ratio as a percentage. Near-zero or negative income
/// saturates to 100%.
pub fn debt_to_income_ratio(monthly_income: Decimal, monthly_debt: Decimal) -> Decimal {
    if monthly_income <= Decimal::ZERO || monthly_income.abs() < Decimal::new(1, 2) {
        return Decimal::from(100);
    }
    percent(monthly_debt, monthly_income)
}

/// Estimated payment-to-income ratio as a percentage, assuming a 36-month
/// term.
pub fn payment_to_income_ratio(requested_amount: Decimal, monthly_income: Decimal) -> Decimal {
    let estimated_payment = requested_amount / Decimal::from(LOAN_TERM_MONTHS);
    debt_to_income_ratio(monthly_income, estimated_payment)
}

/// Requested amount as a multiple of annual income. Near-zero income
/// saturates to the maximum score.
pub fn loan_to_income_multiple(requested_amount: Decimal, monthly_income: Decimal) -> Decimal {
    let annual_income = monthly_income * Decimal::from(12);
    if annual_income <= Decimal::ZERO || annual_income.abs() < Decimal::new(1, 2) {
        return Decimal::from(MAX_SCORE);
    }
    requested_amount / annual_income
}

pub const LOAN_TERM_MONTHS: i64 = 36;

/// Map accumulated risk points to a final (score, level, recommendation).
pub fn determine_risk_level(
    risk_points: i64,
    requires_review: bool,
) -> (Decimal, RiskLevel, ApprovalRecommendation) {
    let score = risk_points.clamp(MIN_SCORE, MAX_SCORE);

    let (level, recommendation) = if score >= CRITICAL_THRESHOLD {
        (RiskLevel::Critical, ApprovalRecommendation::Reject)
    } else if score >= HIGH_THRESHOLD {
        (RiskLevel::High, ApprovalRecommendation::Review)
    } else if score >= MEDIUM_THRESHOLD {
        let rec = if requires_review {
            ApprovalRecommendation::Review
        } else {
            ApprovalRecommendation::Approve
        };
        (RiskLevel::Medium, rec)
    } else {
        (RiskLevel::Low, ApprovalRecommendation::Approve)
    };

    (Decimal::from(score), level, recommendation)
}

/// Normalize a document: trim, uppercase, drop spaces, dots and hyphens.
/// The document digest uses the same normalization, so formatting variants
/// of one document share a digest.
pub fn normalize_document(document: &str) -> String {
    document
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-' && *c != '.')
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn near_zero_income_saturates_ratios() {
        assert_eq!(
            debt_to_income_ratio(dec("0.005"), dec("100")),
            Decimal::from(100)
        );
        assert_eq!(
            debt_to_income_ratio(dec("0"), dec("100")),
            Decimal::from(100)
        );
        assert_eq!(
            loan_to_income_multiple(dec("10000"), dec("0")),
            Decimal::from(100)
        );
    }

    #[test]
    fn ratios_divide_decimals() {
        assert_eq!(debt_to_income_ratio(dec("3000"), dec("600")), dec("20"));
        assert_eq!(loan_to_income_multiple(dec("72000"), dec("3000")), dec("2"));
    }

    #[test]
    fn risk_levels_follow_thresholds() {
        let (score, level, rec) = determine_risk_level(0, false);
        assert_eq!(score, Decimal::ZERO);
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(rec, ApprovalRecommendation::Approve);

        // Below the medium threshold the score wins even when a check
        // flagged the file for review.
        let (_, level, rec) = determine_risk_level(15, true);
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(rec, ApprovalRecommendation::Approve);

        let (_, level, rec) = determine_risk_level(45, false);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(rec, ApprovalRecommendation::Approve);

        let (_, level, rec) = determine_risk_level(45, true);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(rec, ApprovalRecommendation::Review);

        let (_, level, rec) = determine_risk_level(65, false);
        assert_eq!(level, RiskLevel::High);
        assert_eq!(rec, ApprovalRecommendation::Review);

        let (score, level, rec) = determine_risk_level(150, false);
        assert_eq!(score, Decimal::from(100));
        assert_eq!(level, RiskLevel::Critical);
        assert_eq!(rec, ApprovalRecommendation::Reject);
    }

    #[test]
    fn normalization_strips_separators_and_uppercases() {
        assert_eq!(normalize_document(" 12345678-z "), "12345678Z");
        assert_eq!(normalize_document("123.456.789-09"), "12345678909");
    }

    #[test]
    fn mexico_requires_state_field() {
        let strategy = strategy_for(Country::MX, None);
        assert!(strategy.required_fields().contains(&"state"));
        let strategy = strategy_for(Country::ES, None);
        assert!(!strategy.required_fields().contains(&"state"));
    }

    #[test]
    fn unsupported_country_code_is_a_validation_error() {
        assert!(strategy_for_code("AR", None).is_err());
        assert!(strategy_for_code("es", None).is_ok());
    }
}
