//! Result types produced by document validation, provider calls and the
//! per-country risk rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::common::decimal::opt_decimal_to_string;

/// Outcome of an identity-document check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        ValidationResult {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn valid_with_warnings(warnings: Vec<String>) -> Self {
        ValidationResult {
            is_valid: true,
            warnings,
            ..Default::default()
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        ValidationResult {
            is_valid: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

/// Banking data returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankingData {
    pub provider_name: String,
    pub account_status: String,
    pub credit_score: Option<i32>,
    pub total_debt: Option<Decimal>,
    pub monthly_obligations: Option<Decimal>,
    pub has_defaults: bool,
    pub additional_data: Map<String, Value>,
}

impl BankingData {
    /// JSON form for persistence: decimals serialized as scale-2 strings so
    /// they survive the JSONB boundary without precision games.
    pub fn to_persisted_json(&self) -> Value {
        json!({
            "provider_name": self.provider_name,
            "account_status": self.account_status,
            "credit_score": self.credit_score,
            "total_debt": opt_decimal_to_string(self.total_debt),
            "monthly_obligations": opt_decimal_to_string(self.monthly_obligations),
            "has_defaults": self.has_defaults,
            "additional_data": Value::Object(self.additional_data.clone()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalRecommendation {
    Approve,
    Reject,
    Review,
}

/// Outcome of applying a country's business rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0..=100, scale 2.
    pub risk_score: Decimal,
    pub risk_level: RiskLevel,
    pub approval_recommendation: ApprovalRecommendation,
    pub reasons: Vec<String>,
    pub requires_review: bool,
}

impl RiskAssessment {
    /// Immediate rejection for hard-limit violations: maximum score,
    /// critical risk.
    pub fn hard_reject(reason: String) -> Self {
        RiskAssessment {
            risk_score: Decimal::from(100),
            risk_level: RiskLevel::Critical,
            approval_recommendation: ApprovalRecommendation::Reject,
            reasons: vec![reason],
            requires_review: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_reject_pins_score_and_level() {
        let assessment = RiskAssessment::hard_reject("over the limit".into());
        assert_eq!(assessment.risk_score, Decimal::from(100));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
    }

    #[test]
    fn persisted_banking_data_serializes_decimals_as_strings() {
        let data = BankingData {
            provider_name: "Banco Central Mock".into(),
            account_status: "active".into(),
            credit_score: Some(640),
            total_debt: Some("1234.5".parse().unwrap()),
            monthly_obligations: None,
            has_defaults: false,
            additional_data: Map::new(),
        };
        let value = data.to_persisted_json();
        assert_eq!(value["total_debt"], json!("1234.50"));
        assert_eq!(value["monthly_obligations"], Value::Null);
        assert_eq!(value["credit_score"], json!(640));
    }

    #[test]
    fn validation_result_constructors() {
        assert!(ValidationResult::valid().is_valid);
        let invalid = ValidationResult::invalid("bad checksum");
        assert!(!invalid.is_valid);
        assert_eq!(invalid.errors, vec!["bad checksum".to_string()]);
    }
}
