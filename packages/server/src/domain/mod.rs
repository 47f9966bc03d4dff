//! Pure business logic: status transitions and country-specific rules.
//!
//! Everything here is synchronous and side-effect free; I/O lives in the
//! store, providers and services.

pub mod country;
pub mod risk;
pub mod state_machine;

pub use country::Strategy;
pub use risk::{ApprovalRecommendation, BankingData, RiskAssessment, RiskLevel, ValidationResult};
