//! Fixed-point helpers.
//!
//! Money and scores are `rust_decimal::Decimal` at scale 2 throughout.
//! Crossing a JSON boundary (banking_data, bus payloads, API bodies)
//! serializes decimals as strings so no reader is tempted into floats.

use rust_decimal::Decimal;

use super::errors::AppError;

/// Round to scale 2, banker's rounding not wanted for money: half-up.
pub fn money_scale2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Validate a risk score into [0, 100] at scale 2.
pub fn validate_risk_score(value: Decimal) -> Result<Decimal, AppError> {
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err(AppError::Validation(format!(
            "risk_score must be between 0 and 100 (got {value})"
        )));
    }
    Ok(money_scale2(value))
}

/// Serialize a decimal as a scale-2 string for JSON payloads.
pub fn decimal_to_string(value: Decimal) -> String {
    let mut rounded = money_scale2(value);
    rounded.rescale(2);
    rounded.to_string()
}

/// Serialize an optional decimal as a scale-2 string.
pub fn opt_decimal_to_string(value: Option<Decimal>) -> Option<String> {
    value.map(decimal_to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_up_to_scale_two() {
        assert_eq!(money_scale2(dec("10.005")), dec("10.01"));
        assert_eq!(money_scale2(dec("10.004")), dec("10.00"));
    }

    #[test]
    fn risk_score_range_is_enforced() {
        assert!(validate_risk_score(dec("-0.01")).is_err());
        assert!(validate_risk_score(dec("100.01")).is_err());
        assert_eq!(validate_risk_score(dec("42.555")).unwrap(), dec("42.56"));
    }

    #[test]
    fn string_serialization_preserves_scale() {
        assert_eq!(decimal_to_string(dec("10000")), "10000.00");
        assert_eq!(decimal_to_string(dec("14.166666")), "14.17");
    }
}
