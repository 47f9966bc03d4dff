//! Brazil: CPF validation and lending rules.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::domain::risk::{
    ApprovalRecommendation, BankingData, RiskAssessment, RiskLevel, ValidationResult,
};

use super::{
    debt_to_income_ratio, loan_to_income_multiple, normalize_document, CLEAN_PROFILE_FLOOR,
    CRITICAL_THRESHOLD, GOOD_SCORE_THRESHOLD, HIGH_THRESHOLD, LOAN_TERM_MONTHS, MAX_SCORE,
    MEDIUM_THRESHOLD,
};

const MIN_MONTHLY_INCOME: i64 = 2_000;
const MAX_LOAN_AMOUNT: i64 = 100_000;
const MAX_LOAN_TO_INCOME_MULTIPLE: i64 = 5;
const MAX_DEBT_TO_INCOME_PCT: i64 = 35;
const MIN_CREDIT_SCORE: i32 = 550;
const MIN_ACCOUNT_AGE_MONTHS: i64 = 24;

/// Validate a Brazilian CPF.
///
/// Eleven digits; the last two are check digits computed with the double
/// mod-11 scheme. All-equal digit sequences are rejected outright.
pub fn validate_cpf(document: &str) -> ValidationResult {
    let cpf = normalize_document(document);

    if cpf.len() != 11 {
        return ValidationResult::invalid(format!("CPF must have 11 digits, got {}", cpf.len()));
    }

    if !cpf.bytes().all(|b| b.is_ascii_digit()) {
        return ValidationResult::invalid("CPF must contain only digits");
    }

    let digits: Vec<u32> = cpf.bytes().map(|b| u32::from(b - b'0')).collect();

    if digits.iter().all(|&d| d == digits[0]) {
        return ValidationResult::invalid("CPF cannot have all equal digits");
    }

    let first: u32 = (0..9).map(|i| digits[i] * (10 - i as u32)).sum::<u32>() * 10 % 11 % 10;
    if digits[9] != first {
        return ValidationResult::invalid("Invalid CPF checksum (first digit)");
    }

    let second: u32 = (0..10).map(|i| digits[i] * (11 - i as u32)).sum::<u32>() * 10 % 11 % 10;
    if digits[10] != second {
        return ValidationResult::invalid("Invalid CPF checksum (second digit)");
    }

    ValidationResult::valid()
}

/// Brazilian lending rules.
///
/// - Minimum income: R$ 2,000
/// - Maximum loan amount: R$ 100,000
/// - Loan at most 5x annual income
/// - Debt-to-income (existing plus new payment) at most 35%
/// - Minimum credit score: 550
/// - No active defaults
///
/// Good bureau scores and seasoned accounts earn small positive
/// adjustments before the final level is derived.
pub fn evaluate(
    requested_amount: Decimal,
    monthly_income: Decimal,
    banking_data: &BankingData,
    _country_specific_data: &Map<String, Value>,
) -> RiskAssessment {
    let mut validation_errors = Vec::new();
    let mut risk_score = Decimal::ZERO;
    let mut decision = ApprovalRecommendation::Approve;

    if monthly_income < Decimal::from(MIN_MONTHLY_INCOME) {
        validation_errors.push(format!(
            "Monthly income (R$ {monthly_income:.2}) below minimum (R$ {MIN_MONTHLY_INCOME}.00)"
        ));
        risk_score += Decimal::from(40);
        decision = ApprovalRecommendation::Reject;
    }

    if requested_amount > Decimal::from(MAX_LOAN_AMOUNT) {
        validation_errors.push(format!(
            "Requested amount (R$ {requested_amount:.2}) exceeds maximum (R$ {MAX_LOAN_AMOUNT}.00)"
        ));
        risk_score += Decimal::from(30);
        decision = ApprovalRecommendation::Reject;
    }

    let multiple = loan_to_income_multiple(requested_amount, monthly_income);
    if multiple > Decimal::from(MAX_LOAN_TO_INCOME_MULTIPLE) {
        validation_errors.push(format!(
            "Loan-to-income ratio ({multiple:.2}x) exceeds maximum ({MAX_LOAN_TO_INCOME_MULTIPLE}x annual income)"
        ));
        risk_score += Decimal::from(35);
        decision = ApprovalRecommendation::Reject;
    }

    if let Some(obligations) = banking_data.monthly_obligations {
        let new_payment = requested_amount / Decimal::from(LOAN_TERM_MONTHS);
        let dti = debt_to_income_ratio(monthly_income, obligations + new_payment);
        if dti > Decimal::from(MAX_DEBT_TO_INCOME_PCT) {
            validation_errors.push(format!(
                "Debt-to-income ratio ({dti:.1}%) exceeds maximum ({MAX_DEBT_TO_INCOME_PCT}%)"
            ));
            risk_score += Decimal::from(25);
            if decision == ApprovalRecommendation::Approve {
                decision = ApprovalRecommendation::Review;
            }
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

    // Positive adjustments.
    if let Some(score) = banking_data.credit_score {
        if score >= GOOD_SCORE_THRESHOLD {
            risk_score = (risk_score - Decimal::from(10)).max(Decimal::ZERO);
        }
    }
    if let Some(age) = banking_data
        .additional_data
        .get("account_age_months")
        .and_then(Value::as_i64)
    {
        if age >= MIN_ACCOUNT_AGE_MONTHS {
            risk_score = (risk_score - Decimal::from(5)).max(Decimal::ZERO);
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
