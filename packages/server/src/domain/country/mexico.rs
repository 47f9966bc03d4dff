//! Mexico: CURP validation and lending rules.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::risk::{BankingData, RiskAssessment, ValidationResult};

use super::{
    debt_to_income_ratio, determine_risk_level, loan_to_income_multiple, normalize_document,
    payment_to_income_ratio, GOOD_SCORE_THRESHOLD, LOAN_TERM_MONTHS,
};

const MAX_LOAN_AMOUNT: i64 = 200_000;
const MIN_MONTHLY_INCOME: i64 = 8_000;
const MAX_LOAN_TO_INCOME_MULTIPLE: i64 = 3;
const MAX_PAYMENT_TO_INCOME_PCT: i64 = 30;
const MAX_TOTAL_DEBT_TO_INCOME_PCT: i64 = 40;
const MIN_CREDIT_SCORE: i32 = 600;
const MIN_APPLICANT_AGE: i32 = 18;

/// INEGI two-letter state codes, plus NE for citizens born abroad.
const VALID_STATES: &[&str] = &[
    "AS", "BC", "BS", "CC", "CL", "CM", "CS", "CH", "DF", "DG", "GT", "GR", "HG", "JC", "MC",
    "MN", "MS", "NT", "NL", "OC", "PL", "QT", "QR", "SP", "SL", "SR", "TC", "TS", "TL", "VZ",
    "YN", "ZS", "NE",
];

/// Validate a Mexican CURP.
///
/// Eighteen characters: four name letters, six birth-date digits, gender
/// (H/M), five letters (state code + internal consonants), two check
/// digits. Applicants must be at least 18 years old. Unknown state codes
/// warn rather than reject.
pub fn validate_curp(document: &str) -> ValidationResult {
    let curp = normalize_document(document);
    let bytes = curp.as_bytes();

    if bytes.len() != 18 {
        return ValidationResult::invalid(format!(
            "CURP must be exactly 18 characters long (received {})",
            bytes.len()
        ));
    }

    let well_formed = bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4..10].iter().all(u8::is_ascii_digit)
        && matches!(bytes[10], b'H' | b'M')
        && bytes[11..16].iter().all(u8::is_ascii_uppercase)
        && bytes[16..18].iter().all(u8::is_ascii_digit);
    if !well_formed {
        return ValidationResult::invalid(
            "CURP format invalid. Expected format: AAAA######HBBCCCDD (e.g., HERM850101MDFRRR01)",
        );
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let year: i32 = curp[4..6].parse().expect("two ascii digits");
    let month: u32 = curp[6..8].parse().expect("two ascii digits");
    let day: u32 = curp[8..10].parse().expect("two ascii digits");

    let current_year_2digit = Utc::now().year() % 100;
    let full_year = if year <= current_year_2digit {
        2000 + year
    } else {
        1900 + year
    };

    match NaiveDate::from_ymd_opt(full_year, month, day) {
        Some(birth_date) => {
            let today = Utc::now().date_naive();
            let mut age = today.year() - birth_date.year();
            if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
                age -= 1;
            }
            if age < MIN_APPLICANT_AGE {
                errors.push(format!(
                    "Applicant must be at least {MIN_APPLICANT_AGE} years old (age: {age})"
                ));
            }
        }
        None => errors.push(format!(
            "Invalid date of birth in CURP: {}",
            &curp[4..10]
        )),
    }

    let state_code = &curp[11..13];
    if !VALID_STATES.contains(&state_code) {
        warnings.push(format!(
            "State code '{state_code}' not recognized in standard catalog"
        ));
    }

    if !errors.is_empty() {
        return ValidationResult {
            is_valid: false,
            errors,
            warnings,
            metadata: Default::default(),
        };
    }

    ValidationResult::valid_with_warnings(warnings)
}

/// Mexican lending rules.
///
/// 1. Maximum loan amount MXN 200,000 (hard rejection).
/// 2. Minimum monthly income MXN 8,000.
/// 3. Loan at most 3x annual income.
/// 4. Estimated payment-to-income below 30%.
/// 5. Total debt-to-income (existing plus new payment) below 40%.
/// 6. Credit score at least 600.
/// 7. No active defaults.
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
            "Requested amount (${requested_amount:.2} MXN) exceeds maximum allowed (${MAX_LOAN_AMOUNT}.00 MXN)"
        ));
    }

    if monthly_income < Decimal::from(MIN_MONTHLY_INCOME) {
        reasons.push(format!(
            "Monthly income below minimum: ${monthly_income:.2} MXN (min ${MIN_MONTHLY_INCOME}.00 MXN)"
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

    let payment_ratio = payment_to_income_ratio(requested_amount, monthly_income);
    if payment_ratio > Decimal::from(MAX_PAYMENT_TO_INCOME_PCT) {
        reasons.push(format!(
            "Estimated payment-to-income ratio too high: {payment_ratio:.1}% (max {MAX_PAYMENT_TO_INCOME_PCT}%)"
        ));
        risk_points += 20;
    }

    if let Some(obligations) = banking_data.monthly_obligations {
        let new_payment = requested_amount / Decimal::from(LOAN_TERM_MONTHS);
        let total_dti = debt_to_income_ratio(monthly_income, obligations + new_payment);
        if total_dti > Decimal::from(MAX_TOTAL_DEBT_TO_INCOME_PCT) {
            reasons.push(format!(
                "Total debt-to-income ratio too high: {total_dti:.1}% (max {MAX_TOTAL_DEBT_TO_INCOME_PCT}%)"
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
