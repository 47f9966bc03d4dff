//! Core enums shared across the API, the store and the workers.

use serde::{Deserialize, Serialize};

/// Supported countries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "country_code")]
pub enum Country {
    ES,
    PT,
    IT,
    MX,
    CO,
    BR,
}

impl Country {
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "ES" => Some(Country::ES),
            "PT" => Some(Country::PT),
            "IT" => Some(Country::IT),
            "MX" => Some(Country::MX),
            "CO" => Some(Country::CO),
            "BR" => Some(Country::BR),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Country::ES => "ES",
            Country::PT => "PT",
            Country::IT => "IT",
            Country::MX => "MX",
            Country::CO => "CO",
            Country::BR => "BR",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Country::ES => "Spain",
            Country::PT => "Portugal",
            Country::IT => "Italy",
            Country::MX => "Mexico",
            Country::CO => "Colombia",
            Country::BR => "Brazil",
        }
    }

    /// The single currency accepted for applications from this country.
    pub fn expected_currency(self) -> &'static str {
        match self {
            Country::ES | Country::PT | Country::IT => "EUR",
            Country::MX => "MXN",
            Country::CO => "COP",
            Country::BR => "BRL",
        }
    }

    pub fn all() -> [Country; 6] {
        [
            Country::ES,
            Country::PT,
            Country::IT,
            Country::MX,
            Country::CO,
            Country::BR,
        ]
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application lifecycle status. Transitions are governed by the state
/// machine in `domain::state_machine`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "application_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Validating,
    Approved,
    Rejected,
    UnderReview,
    Cancelled,
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Validating => "VALIDATING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::UnderReview => "UNDER_REVIEW",
            ApplicationStatus::Cancelled => "CANCELLED",
            ApplicationStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ApplicationStatus::Pending),
            "VALIDATING" => Some(ApplicationStatus::Validating),
            "APPROVED" => Some(ApplicationStatus::Approved),
            "REJECTED" => Some(ApplicationStatus::Rejected),
            "UNDER_REVIEW" => Some(ApplicationStatus::UnderReview),
            "CANCELLED" => Some(ApplicationStatus::Cancelled),
            "COMPLETED" => Some(ApplicationStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses that still hold the per-(country, document) uniqueness slot.
pub const ACTIVE_STATUSES: [ApplicationStatus; 4] = [
    ApplicationStatus::Pending,
    ApplicationStatus::Validating,
    ApplicationStatus::UnderReview,
    ApplicationStatus::Approved,
];
