//! Application endpoints.
//!
//! Responses carry masked PII: `identity_document` shows only its last
//! four characters. Decimals cross the JSON boundary as scale-2 strings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::decimal::{decimal_to_string, opt_decimal_to_string};
use crate::common::errors::AppError;
use crate::common::pagination::{Page, PageParams};
use crate::common::types::{ApplicationStatus, Country};
use crate::services::{ApplicationCreate, ApplicationUpdate, DecryptedApplication};
use crate::server::app::AppState;
use crate::store::applications::{CountryStats, ListFilters};
use crate::store::{AuditLog, PendingJob};

#[derive(Debug, Serialize)]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub country: Country,
    pub full_name: String,
    /// Masked: asterisks plus the last four characters.
    pub identity_document: String,
    pub requested_amount: String,
    pub monthly_income: String,
    pub currency: String,
    pub status: ApplicationStatus,
    pub country_specific_data: serde_json::Value,
    pub banking_data: serde_json::Value,
    pub validation_errors: Vec<String>,
    pub risk_score: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DecryptedApplication> for ApplicationResponse {
    fn from(decrypted: DecryptedApplication) -> Self {
        let app = decrypted.application;
        ApplicationResponse {
            id: app.id,
            country: app.country,
            full_name: decrypted.full_name,
            identity_document: decrypted.identity_document_masked,
            requested_amount: decimal_to_string(app.requested_amount),
            monthly_income: decimal_to_string(app.monthly_income),
            currency: app.currency.trim().to_string(),
            status: app.status,
            country_specific_data: app.country_specific_data.clone(),
            banking_data: app.banking_data.clone(),
            validation_errors: app.validation_errors_vec(),
            risk_score: opt_decimal_to_string(app.risk_score),
            rejection_reason: app.rejection_reason.clone(),
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

pub async fn create_application(
    State(state): State<AppState>,
    Json(input): Json<ApplicationCreate>,
) -> Result<(StatusCode, Json<ApplicationResponse>), AppError> {
    let outcome = state.commands.create_application(input).await?;
    let decrypted = state.queries.get_application(outcome.application.id).await?;
    Ok((StatusCode::CREATED, Json(decrypted.into())))
}

pub async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ApplicationResponse>>, AppError> {
    let filters = ListFilters {
        country: parse_optional(query.country.as_deref(), Country::parse, "country")?,
        status: parse_optional(query.status.as_deref(), ApplicationStatus::parse, "status")?,
    };
    let params = PageParams {
        page: query.page,
        page_size: query.page_size,
    };
    let page = state.queries.list_applications(filters, params).await?;
    Ok(Json(page.map(ApplicationResponse::from)))
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let id = parse_application_id(&id)?;
    let decrypted = state.queries.get_application(id).await?;
    Ok(Json(decrypted.into()))
}

pub async fn update_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ApplicationUpdate>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let id = parse_application_id(&id)?;
    state.commands.update_application(id, update).await?;
    let decrypted = state.queries.get_application(id).await?;
    Ok(Json(decrypted.into()))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

pub async fn delete_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = parse_application_id(&id)?;
    state.commands.soft_delete(id).await?;
    Ok(Json(DeleteResponse {
        message: format!("Application {id} deleted"),
    }))
}

pub async fn get_audit_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<AuditLog>>, AppError> {
    let id = parse_application_id(&id)?;
    let logs = state.queries.get_audit_logs(id, page).await?;
    Ok(Json(logs))
}

pub async fn get_pending_jobs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PendingJob>>, AppError> {
    let id = parse_application_id(&id)?;
    let jobs = state.queries.get_pending_jobs(id).await?;
    Ok(Json(jobs))
}

pub async fn country_statistics(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CountryStats>, AppError> {
    let stats = state.queries.statistics_by_country(&code).await?;
    Ok(Json(stats))
}

fn parse_application_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidApplicationId(raw.to_string()))
}

fn parse_optional<T>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
    field: &str,
) -> Result<Option<T>, AppError> {
    match raw {
        None => Ok(None),
        Some(value) => parse(value)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("invalid {field} '{value}'"))),
    }
}
