//! Spain: DNI validation and lending rules.

use rust_decimal::Decimal;

use crate::domain::risk::{BankingData, RiskAssessment, ValidationResult};

use super::{
    debt_to_income_ratio, determine_risk_level, normalize_document, payment_to_income_ratio,
    GOOD_SCORE_THRESHOLD,
};

const DNI_LETTERS: &[u8; 23] = b"TRWAGMYFPDXBNJZSQVHLCKE";

const MAX_LOAN_AMOUNT: i64 = 50_000;
const HIGH_AMOUNT_THRESHOLD: i64 = 20_000;
const MAX_DEBT_TO_INCOME_PCT: i64 = 40;
const MAX_PAYMENT_TO_INCOME_PCT: i64 = 35;
const MIN_CREDIT_SCORE: i32 = 600;

/// Validate a Spanish DNI: 8 digits plus a checksum letter computed as
/// number mod 23 into the official letter table.
pub fn validate_dni(document: &str) -> ValidationResult {
    let dni = normalize_document(document);
    let bytes = dni.as_bytes();

    let well_formed = bytes.len() == 9
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8].is_ascii_uppercase();
    if !well_formed {
        return ValidationResult::invalid(
            "DNI format invalid. Must be 8 digits followed by a letter (e.g., 12345678Z)",
        );
    }

    let number: u64 = dni[..8].parse().expect("8 ascii digits");
    let expected = DNI_LETTERS[(number % 23) as usize] as char;
    let got = bytes[8] as char;

    if got != expected {
        return ValidationResult::invalid(format!(
            "DNI checksum invalid. Expected letter '{expected}' but got '{got}'"
        ));
    }

    ValidationResult::valid()
}

/// Spanish lending rules.
///
/// 1. Maximum loan amount €50,000 (hard rejection).
/// 2. Amounts above €20,000 require review.
/// 3. Debt-to-income below 40%.
/// 4. Credit score at least 600.
/// 5. No active defaults.
/// 6. Estimated payment-to-income below 35%.
pub fn evaluate(
    requested_amount: Decimal,
    monthly_income: Decimal,
    banking_data: &BankingData,
) -> RiskAssessment {
    let mut reasons = Vec::new();
    let mut requires_review = false;
    let mut risk_points: i64 = 0;

    if requested_amount > Decimal::from(MAX_LOAN_AMOUNT) {
        return RiskAssessment::hard_reject(format!(
            "Requested amount (€{requested_amount:.2}) exceeds maximum allowed (€{MAX_LOAN_AMOUNT}.00)"
        ));
    }

    if requested_amount > Decimal::from(HIGH_AMOUNT_THRESHOLD) {
        reasons.push(format!(
            "High amount requested (€{requested_amount:.2} above €{HIGH_AMOUNT_THRESHOLD}.00 threshold)"
        ));
        risk_points += 15;
        requires_review = true;
    }

    if let Some(obligations) = banking_data.monthly_obligations {
        let dti = debt_to_income_ratio(monthly_income, obligations);
        if dti > Decimal::from(MAX_DEBT_TO_INCOME_PCT) {
            reasons.push(format!(
                "Debt-to-income ratio too high: {dti:.1}% (max {MAX_DEBT_TO_INCOME_PCT}%)"
            ));
            risk_points += 30;
            requires_review = true;
        }
    }

    match banking_data.credit_score {
        Some(score) if score < MIN_CREDIT_SCORE => {
            reasons.push(format!(
                "Credit score below minimum: {score} (min {MIN_CREDIT_SCORE})"
            ));
            risk_points += 35;
        }
        Some(score) if score >= GOOD_SCORE_THRESHOLD => {
            risk_points -= 10;
        }
        _ => {}
    }

    if banking_data.has_defaults {
        reasons.push("Applicant has active defaults".to_string());
        risk_points += 40;
        requires_review = true;
    }

    let payment_ratio = payment_to_income_ratio(requested_amount, monthly_income);
    if payment_ratio > Decimal::from(MAX_PAYMENT_TO_INCOME_PCT) {
        reasons.push(format!(
            "Estimated payment-to-income ratio too high: {payment_ratio:.1}% (max {MAX_PAYMENT_TO_INCOME_PCT}%)"
        ));
        risk_points += 20;
    }

    let (risk_score, risk_level, recommendation) =
        determine_risk_level(risk_points, requires_review);

    if reasons.is_empty() {
        reasons.push("Standard credit profile".to_string());
    }

    RiskAssessment {
        risk_score,
        risk_level,
        approval_recommendation: recommendation,
        reasons,
        requires_review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::{ApprovalRecommendation, RiskLevel};
    use serde_json::Map;

    fn banking(score: Option<i32>, obligations: Option<&str>, defaults: bool) -> BankingData {
        BankingData {
            provider_name: "test".into(),
            account_status: "active".into(),
            credit_score: score,
            total_debt: None,
            monthly_obligations: obligations.map(|s| s.parse().unwrap()),
            has_defaults: defaults,
            additional_data: Map::new(),
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn accepts_valid_dni() {
        assert!(validate_dni("12345678Z").is_valid);
        assert!(validate_dni("12345678-z").is_valid);
    }

    #[test]
    fn rejects_wrong_checksum_letter() {
        let result = validate_dni("12345678A");
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("Expected letter 'Z'"));
    }

    #[test]
    fn rejects_malformed_dni() {
        assert!(!validate_dni("1234567Z").is_valid);
        assert!(!validate_dni("ABCDEFGHZ").is_valid);
        assert!(!validate_dni("").is_valid);
    }

    #[test]
    fn over_limit_amount_is_hard_rejected() {
        let assessment = evaluate(dec("100000.00"), dec("3000"), &banking(Some(700), None, false));
        assert_eq!(assessment.risk_score, Decimal::from(100));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
        assert!(assessment.reasons[0].contains("exceeds maximum"));
    }

    #[test]
    fn clean_profile_approves() {
        let assessment = evaluate(dec("10000.00"), dec("3000"), &banking(Some(700), None, false));
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Approve
        );
        assert_eq!(assessment.reasons, vec!["Standard credit profile"]);
    }

    #[test]
    fn high_amount_flags_review_but_score_stays_low() {
        let assessment = evaluate(dec("25000.00"), dec("9000"), &banking(Some(700), None, false));
        assert!(assessment.requires_review);
        assert!(assessment.reasons.iter().any(|r| r.contains("High amount")));
        // 15 points is still LOW tier; the recommendation follows the
        // score, the review flag rides along for the back office.
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Approve
        );
    }

    #[test]
    fn defaults_push_toward_review() {
        let assessment = evaluate(dec("5000.00"), dec("3000"), &banking(Some(700), None, true));
        assert!(assessment.requires_review);
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("active defaults")));
    }

    #[test]
    fn low_credit_score_is_penalized() {
        let good = evaluate(dec("5000.00"), dec("3000"), &banking(Some(700), None, false));
        let poor = evaluate(dec("5000.00"), dec("3000"), &banking(Some(550), None, false));
        assert!(poor.risk_score > good.risk_score);
        assert!(poor.reasons.iter().any(|r| r.contains("below minimum")));
    }

    #[test]
    fn excellent_score_earns_an_adjustment() {
        let base = evaluate(dec("25000.00"), dec("9000"), &banking(Some(700), None, false));
        let excellent = evaluate(dec("25000.00"), dec("9000"), &banking(Some(800), None, false));
        assert!(excellent.risk_score < base.risk_score);
    }

    #[test]
    fn stretched_payment_ratio_is_flagged() {
        // 18,000 over 36 months is 500/month against 1,200 income: 41.7%.
        let assessment = evaluate(dec("18000.00"), dec("1200"), &banking(Some(700), None, false));
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("payment-to-income")));
    }
}
