//! Portugal: NIF validation and lending rules.

use rust_decimal::Decimal;

use crate::domain::risk::{BankingData, RiskAssessment, ValidationResult};

use super::{
    debt_to_income_ratio, determine_risk_level, loan_to_income_multiple, normalize_document,
    payment_to_income_ratio, GOOD_SCORE_THRESHOLD,
};

const MAX_LOAN_AMOUNT: i64 = 30_000;
const MIN_MONTHLY_INCOME: i64 = 1_000;
const MAX_LOAN_TO_INCOME_MULTIPLE: i64 = 4;
const MAX_DEBT_TO_INCOME_PCT: i64 = 40;
const MAX_PAYMENT_TO_INCOME_PCT: i64 = 35;
const MIN_CREDIT_SCORE: i32 = 600;

const NIF_WEIGHTS: [u32; 8] = [9, 8, 7, 6, 5, 4, 3, 2];

/// Validate a Portuguese NIF: 9 digits where the last is a weighted
/// checksum (11 minus the weighted sum mod 11; 10 and 11 collapse to 0).
pub fn validate_nif(document: &str) -> ValidationResult {
    let nif = normalize_document(document);

    if nif.len() != 9 {
        return ValidationResult::invalid(format!(
            "NIF must be exactly 9 digits long (received {})",
            nif.len()
        ));
    }

    if !nif.bytes().all(|b| b.is_ascii_digit()) {
        return ValidationResult::invalid("NIF must contain only digits");
    }

    let digits: Vec<u32> = nif.bytes().map(|b| u32::from(b - b'0')).collect();
    let weighted_sum: u32 = digits[..8]
        .iter()
        .zip(NIF_WEIGHTS)
        .map(|(d, w)| d * w)
        .sum();

    let mut expected = 11 - (weighted_sum % 11);
    if expected >= 10 {
        expected = 0;
    }

    if digits[8] != expected {
        return ValidationResult::invalid(format!(
            "NIF checksum invalid. Expected {expected}, got {}",
            digits[8]
        ));
    }

    ValidationResult::valid()
}

/// Portuguese lending rules.
///
/// 1. Maximum loan amount €30,000 (hard rejection).
/// 2. Minimum monthly income €1,000.
/// 3. Loan at most 4x annual income.
/// 4. Debt-to-income below 40%.
/// 5. Credit score at least 600.
/// 6. No active defaults.
/// 7. Estimated payment-to-income below 35%.
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

    if monthly_income < Decimal::from(MIN_MONTHLY_INCOME) {
        reasons.push(format!(
            "Monthly income below minimum: €{monthly_income:.2} (min €{MIN_MONTHLY_INCOME}.00)"
        ));
        risk_points += 40;
    }

    let multiple = loan_to_income_multiple(requested_amount, monthly_income);
    if multiple > Decimal::from(MAX_LOAN_TO_INCOME_MULTIPLE) {
        reasons.push(format!(
            "Loan amount ({multiple:.2}x) exceeds maximum ({MAX_LOAN_TO_INCOME_MULTIPLE}x annual income)"
        ));
        risk_points += 25;
        requires_review = true;
    }

    if let Some(obligations) = banking_data.monthly_obligations {
        let dti = debt_to_income_ratio(monthly_income, obligations);
        if dti > Decimal::from(MAX_DEBT_TO_INCOME_PCT) {
            reasons.push(format!(
                "Debt-to-income ratio too high: {dti:.1}% (max {MAX_DEBT_TO_INCOME_PCT}%)"
            ));
            risk_points += 30;
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
            reasons.push("Excellent credit score".to_string());
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
    use crate::domain::risk::ApprovalRecommendation;
    use serde_json::Map;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn clean_banking() -> BankingData {
        BankingData {
            provider_name: "test".into(),
            account_status: "active".into(),
            credit_score: Some(680),
            total_debt: None,
            monthly_obligations: None,
            has_defaults: false,
            additional_data: Map::new(),
        }
    }

    #[test]
    fn accepts_valid_nif() {
        // 123456789: weighted sum 9+16+21+24+25+24+21+16 = 156; 156 % 11 = 2;
        // 11 - 2 = 9 == last digit.
        assert!(validate_nif("123456789").is_valid);
    }

    #[test]
    fn rejects_bad_checksum() {
        let result = validate_nif("123456780");
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("checksum"));
    }

    #[test]
    fn rejects_wrong_length_and_non_digits() {
        assert!(!validate_nif("12345678").is_valid);
        assert!(!validate_nif("12345678A").is_valid);
    }

    #[test]
    fn checksum_of_ten_or_eleven_collapses_to_zero() {
        // 999999990: weighted sum 396, 396 % 11 = 0, 11 - 0 = 11 -> 0.
        assert!(validate_nif("999999990").is_valid);
        // 504426770: weighted sum 166, 166 % 11 = 1, 11 - 1 = 10 -> 0.
        assert!(validate_nif("504426770").is_valid);
    }

    #[test]
    fn separators_are_tolerated() {
        assert!(validate_nif("123 456 789").is_valid);
        assert!(validate_nif("123-456-789").is_valid);
    }

    #[test]
    fn over_limit_amount_is_hard_rejected() {
        let assessment = evaluate(dec("30001.00"), dec("2500"), &clean_banking());
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
        assert_eq!(assessment.risk_score, Decimal::from(100));
    }

    #[test]
    fn low_income_accumulates_heavy_penalty() {
        let assessment = evaluate(dec("2000.00"), dec("800"), &clean_banking());
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("below minimum")));
        assert!(assessment.risk_score >= Decimal::from(40));
    }

    #[test]
    fn modest_loan_with_healthy_profile_approves() {
        let assessment = evaluate(dec("5000.00"), dec("2500"), &clean_banking());
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Approve
        );
    }
}
