//! Colombia: cédula validation and lending rules.

use rust_decimal::Decimal;

use crate::domain::risk::{
    ApprovalRecommendation, BankingData, RiskAssessment, RiskLevel, ValidationResult,
};

use super::{
    normalize_document, payment_to_income_ratio, CLEAN_PROFILE_FLOOR, CRITICAL_THRESHOLD,
    GOOD_SCORE_THRESHOLD, HIGH_THRESHOLD, MAX_SCORE, MEDIUM_THRESHOLD,
};

const MIN_MONTHLY_INCOME: i64 = 1_500_000;
const MAX_LOAN_AMOUNT: i64 = 50_000_000;
const MAX_PAYMENT_TO_INCOME_PCT: i64 = 40;
const MIN_CREDIT_SCORE: i32 = 600;

/// Validate a Colombian Cédula de Ciudadanía: 6 to 10 digits.
pub fn validate_cedula(document: &str) -> ValidationResult {
    let cedula = normalize_document(document);

    if !cedula.bytes().all(|b| b.is_ascii_digit()) {
        return ValidationResult::invalid("Cédula must contain only digits");
    }

    if cedula.len() < 6 || cedula.len() > 10 {
        return ValidationResult::invalid(format!(
            "Cédula must have 6-10 digits, got {}",
            cedula.len()
        ));
    }

    ValidationResult::valid()
}

/// Colombian lending rules.
///
/// - Minimum income: COP $1,500,000
/// - Maximum loan amount: COP $50,000,000
/// - Payment-to-income ratio at most 40%
/// - Minimum credit score: 600
/// - No active defaults
/// - Total debt at most one year of income
pub fn evaluate(
    requested_amount: Decimal,
    monthly_income: Decimal,
    banking_data: &BankingData,
) -> RiskAssessment {
    let mut validation_errors = Vec::new();
    let mut risk_score = Decimal::ZERO;
    let mut decision = ApprovalRecommendation::Approve;

    if monthly_income < Decimal::from(MIN_MONTHLY_INCOME) {
        validation_errors.push(format!(
            "Monthly income (COP ${monthly_income:.2}) below minimum (COP ${MIN_MONTHLY_INCOME}.00)"
        ));
        risk_score += Decimal::from(40);
        decision = ApprovalRecommendation::Reject;
    }

    if requested_amount > Decimal::from(MAX_LOAN_AMOUNT) {
        validation_errors.push(format!(
            "Requested amount (COP ${requested_amount:.2}) exceeds maximum (COP ${MAX_LOAN_AMOUNT}.00)"
        ));
        risk_score += Decimal::from(35);
        decision = ApprovalRecommendation::Reject;
    }

    let payment_ratio = payment_to_income_ratio(requested_amount, monthly_income);
    if payment_ratio > Decimal::from(MAX_PAYMENT_TO_INCOME_PCT) {
        validation_errors.push(format!(
            "Payment-to-income ratio ({payment_ratio:.1}%) exceeds maximum ({MAX_PAYMENT_TO_INCOME_PCT}%)"
        ));
        risk_score += Decimal::from(30);
        if decision == ApprovalRecommendation::Approve {
            decision = ApprovalRecommendation::Review;
        }
    }

    if let Some(score) = banking_data.credit_score {
        if score < MIN_CREDIT_SCORE {
            validation_errors.push(format!(
                "Credit score ({score}) below minimum ({MIN_CREDIT_SCORE})"
            ));
            risk_score += Decimal::from(35);
            decision = ApprovalRecommendation::Reject;
        }
    }

    if banking_data.has_defaults {
        validation_errors.push("Applicant has active defaults".to_string());
        risk_score += Decimal::from(40);
        decision = ApprovalRecommendation::Reject;
    }

    if let Some(total_debt) = banking_data.total_debt {
        let annual_income = monthly_income * Decimal::from(12);
        if total_debt > annual_income {
            validation_errors.push(format!(
                "Total debt (COP ${total_debt:.2}) exceeds one year of income"
            ));
            risk_score += Decimal::from(15);
            if decision == ApprovalRecommendation::Approve {
                decision = ApprovalRecommendation::Review;
            }
        }
    }

    // Positive adjustments.
    if let Some(score) = banking_data.credit_score {
        if score >= GOOD_SCORE_THRESHOLD {
            risk_score = (risk_score - Decimal::from(10)).max(Decimal::ZERO);
        }
    }

    risk_score = risk_score.min(Decimal::from(MAX_SCORE));

    if validation_errors.is_empty() {
        decision = ApprovalRecommendation::Approve;
        risk_score = risk_score.max(Decimal::from(CLEAN_PROFILE_FLOOR));
    }

    let risk_level = if risk_score >= Decimal::from(CRITICAL_THRESHOLD) {
        RiskLevel::Critical
    } else if risk_score >= Decimal::from(HIGH_THRESHOLD) {
        RiskLevel::High
    } else if risk_score >= Decimal::from(MEDIUM_THRESHOLD) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let requires_review = decision == ApprovalRecommendation::Review;

    RiskAssessment {
        risk_score,
        risk_level,
        approval_recommendation: decision,
        reasons: if validation_errors.is_empty() {
            vec!["Standard credit profile".to_string()]
        } else {
            validation_errors
        },
        requires_review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn banking(score: Option<i32>, total_debt: Option<&str>, defaults: bool) -> BankingData {
        BankingData {
            provider_name: "test".into(),
            account_status: "active".into(),
            credit_score: score,
            total_debt: total_debt.map(|s| s.parse().unwrap()),
            monthly_obligations: None,
            has_defaults: defaults,
            additional_data: Map::new(),
        }
    }

    #[test]
    fn accepts_six_to_ten_digit_cedulas() {
        assert!(validate_cedula("123456").is_valid);
        assert!(validate_cedula("1234567890").is_valid);
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(!validate_cedula("12345").is_valid);
        assert!(!validate_cedula("12345678901").is_valid);
    }

    #[test]
    fn rejects_non_digits() {
        assert!(!validate_cedula("12345A7").is_valid);
    }

    #[test]
    fn separators_are_tolerated() {
        assert!(validate_cedula("1.234.567").is_valid);
        assert!(validate_cedula("12-345-678").is_valid);
    }

    #[test]
    fn over_limit_amount_rejects() {
        let assessment = evaluate(
            dec("50000001"),
            dec("10000000"),
            &banking(Some(700), None, false),
        );
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("exceeds maximum")));
    }

    #[test]
    fn low_income_rejects() {
        let assessment = evaluate(
            dec("5000000"),
            dec("1000000"),
            &banking(Some(700), None, false),
        );
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
    }

    #[test]
    fn excessive_total_debt_forces_review() {
        let assessment = evaluate(
            dec("10000000"),
            dec("3000000"),
            &banking(Some(700), Some("40000000"), false),
        );
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Review
        );
        assert!(assessment.requires_review);
    }

    #[test]
    fn clean_profile_approves_with_floor_score() {
        let assessment = evaluate(
            dec("10000000"),
            dec("4000000"),
            &banking(Some(700), None, false),
        );
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Approve
        );
        assert_eq!(assessment.risk_score, Decimal::from(CLEAN_PROFILE_FLOOR));
    }
}
