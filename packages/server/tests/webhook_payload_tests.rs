//! Bank-confirmation payload parsing and signature checks as a client
//! would exercise them.

use credit_core::server::routes::webhooks::{sign_payload, verify_signature, BankConfirmation};

const SECRET: &str = "whsec_integration_test_secret_0123456789";

fn sample_payload() -> serde_json::Value {
    serde_json::json!({
        "application_id": "7f8d1a30-0f3e-4e7e-9f46-0d9f6f3d2b11",
        "document_verified": true,
        "credit_score": 720,
        "total_debt": "15000.50",
        "monthly_obligations": "450.25",
        "has_defaults": false,
        "provider_reference": "REF_A",
        "verified_at": "2026-07-01T12:00:00Z"
    })
}

#[test]
fn full_payload_parses() {
    let confirmation: BankConfirmation = serde_json::from_value(sample_payload()).unwrap();
    assert!(confirmation.document_verified);
    assert_eq!(confirmation.credit_score, Some(720));
    assert_eq!(confirmation.provider_reference, "REF_A");
    assert_eq!(
        confirmation.total_debt,
        Some("15000.50".parse().unwrap())
    );
}

#[test]
fn optional_fields_may_be_absent() {
    let payload = serde_json::json!({
        "application_id": "7f8d1a30-0f3e-4e7e-9f46-0d9f6f3d2b11",
        "document_verified": false,
        "has_defaults": true,
        "provider_reference": "REF_B",
        "verified_at": "2026-07-01T12:00:00Z"
    });
    let confirmation: BankConfirmation = serde_json::from_value(payload).unwrap();
    assert_eq!(confirmation.credit_score, None);
    assert_eq!(confirmation.total_debt, None);
    assert_eq!(confirmation.monthly_obligations, None);
}

#[test]
fn missing_required_fields_fail_to_parse() {
    let payload = serde_json::json!({
        "application_id": "7f8d1a30-0f3e-4e7e-9f46-0d9f6f3d2b11",
        "document_verified": true,
        "has_defaults": false,
        "verified_at": "2026-07-01T12:00:00Z"
    });
    assert!(serde_json::from_value::<BankConfirmation>(payload).is_err());
}

#[test]
fn invalid_uuid_fails_to_parse() {
    let mut payload = sample_payload();
    payload["application_id"] = serde_json::json!("not-a-uuid");
    assert!(serde_json::from_value::<BankConfirmation>(payload).is_err());
}

#[test]
fn decimal_fields_parse_from_strings_without_float_loss() {
    let mut payload = sample_payload();
    payload["total_debt"] = serde_json::json!("0.10");
    let confirmation: BankConfirmation = serde_json::from_value(payload).unwrap();
    assert_eq!(confirmation.total_debt.unwrap().to_string(), "0.10");
}

#[test]
fn signature_verifies_over_exact_bytes() {
    let body = serde_json::to_vec(&sample_payload()).unwrap();
    let signature = sign_payload(SECRET, &body);

    assert!(verify_signature(SECRET, &body, &signature));

    // Any re-serialization that changes a byte invalidates it.
    let mut other = body.clone();
    other[0] ^= 1;
    assert!(!verify_signature(SECRET, &other, &signature));
}

#[test]
fn replayed_signature_with_different_secret_fails() {
    let body = serde_json::to_vec(&sample_payload()).unwrap();
    let signature = sign_payload(SECRET, &body);
    assert!(!verify_signature("another_secret_entirely_0123456789", &body, &signature));
}
