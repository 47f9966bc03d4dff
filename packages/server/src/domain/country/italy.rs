//! Italy: Codice Fiscale validation and lending rules.

use rust_decimal::Decimal;
use serde_json::json;

use crate::domain::risk::{BankingData, RiskAssessment, ValidationResult};

use super::{
    debt_to_income_ratio, determine_risk_level, normalize_document, payment_to_income_ratio,
    GOOD_SCORE_THRESHOLD,
};

const MAX_LOAN_AMOUNT: i64 = 50_000;
const MIN_MONTHLY_INCOME: i64 = 1_200;
const MAX_DEBT_TO_INCOME_PCT: i64 = 35;
const MAX_PAYMENT_TO_INCOME_PCT: i64 = 30;
const MIN_CREDIT_SCORE: i32 = 600;
/// Loans above this many years of income get the stability review.
const YEARS_FOR_STABILITY_CHECK: i64 = 2;

/// Month letters used in the Codice Fiscale birth-date section.
const VALID_MONTH_LETTERS: &str = "ABCDEHLMPRST";

/// Validate an Italian Codice Fiscale.
///
/// Sixteen alphanumeric characters (SSSSNNNYYMDDCCCX). Length and charset
/// are enforced; structural oddities in the inner sections surface as
/// warnings rather than rejections.
pub fn validate_codice_fiscale(document: &str) -> ValidationResult {
    let code = normalize_document(document);
    let bytes = code.as_bytes();

    if bytes.len() != 16 {
        return ValidationResult::invalid(format!(
            "Codice Fiscale must be exactly 16 characters long (received {})",
            bytes.len()
        ));
    }

    if !bytes
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return ValidationResult::invalid(
            "Codice Fiscale must contain only uppercase letters and numbers",
        );
    }

    let mut warnings = Vec::new();

    if !bytes[..6].iter().all(u8::is_ascii_uppercase) {
        warnings.push("First 6 characters should typically be letters".to_string());
    }
    if !bytes[6..8].iter().all(u8::is_ascii_digit) {
        warnings.push("Year part (characters 7-8) should be digits".to_string());
    }
    let month_char = bytes[8] as char;
    if !VALID_MONTH_LETTERS.contains(month_char) {
        warnings.push(format!("Month character '{month_char}' may be invalid"));
    }
    if !bytes[9..11].iter().all(u8::is_ascii_digit) {
        warnings.push("Day part (characters 10-11) should be digits".to_string());
    }
    if !(bytes[15] as char).is_ascii_uppercase() {
        warnings.push("Check character (last) should be a letter".to_string());
    }

    let mut result = ValidationResult::valid_with_warnings(warnings);
    result.metadata.insert(
        "document_type".to_string(),
        json!("Codice Fiscale"),
    );
    result
}

/// Italian lending rules.
///
/// 1. Maximum loan amount €50,000 (hard rejection).
/// 2. Minimum monthly income €1,200.
/// 3. Debt-to-income below 35%.
/// 4. Credit score at least 600.
/// 5. No active defaults.
/// 6. Estimated payment-to-income below 30%.
/// 7. Amounts above two years of income flag a financial stability
///    review.
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

    // Financial stability check.
    let annual_income = monthly_income * Decimal::from(12);
    if requested_amount > annual_income * Decimal::from(YEARS_FOR_STABILITY_CHECK) {
        reasons.push(format!(
            "Requested amount (€{requested_amount:.2}) exceeds {YEARS_FOR_STABILITY_CHECK} years of income"
        ));
        risk_points += 25;
        requires_review = true;
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

    fn banking(score: Option<i32>, defaults: bool) -> BankingData {
        BankingData {
            provider_name: "test".into(),
            account_status: "active".into(),
            credit_score: score,
            total_debt: None,
            monthly_obligations: None,
            has_defaults: defaults,
            additional_data: Map::new(),
        }
    }

    #[test]
    fn accepts_well_formed_codice_fiscale() {
        let result = validate_codice_fiscale("RSSMRA80A01H501U");
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!validate_codice_fiscale("RSSMRA80A01H501").is_valid);
        assert!(!validate_codice_fiscale("RSSMRA80A01H501UX").is_valid);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(!validate_codice_fiscale("RSSMRA80A01H50!U").is_valid);
    }

    #[test]
    fn odd_month_letter_warns_but_validates() {
        let result = validate_codice_fiscale("RSSMRA80Z01H501U");
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("Month")));
    }

    #[test]
    fn lowercase_input_is_normalized() {
        assert!(validate_codice_fiscale("rssmra80a01h501u").is_valid);
    }

    #[test]
    fn over_limit_amount_is_hard_rejected() {
        let assessment = evaluate(dec("50001"), dec("2600"), &banking(Some(700), false));
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Reject
        );
        assert_eq!(assessment.risk_score, Decimal::from(100));
    }

    #[test]
    fn low_income_is_penalized() {
        let assessment = evaluate(dec("3000"), dec("1000"), &banking(Some(700), false));
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("below minimum")));
    }

    #[test]
    fn clean_profile_approves() {
        let assessment = evaluate(dec("8000"), dec("2600"), &banking(Some(700), false));
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Approve
        );
    }

    #[test]
    fn amount_beyond_two_years_of_income_needs_stability_review() {
        // 40,000 against 1,500/month: two years of income is 36,000.
        let assessment = evaluate(dec("40000"), dec("1500"), &banking(Some(700), false));
        assert!(assessment.requires_review);
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("years of income")));
        assert_eq!(
            assessment.approval_recommendation,
            ApprovalRecommendation::Review
        );
    }
}
