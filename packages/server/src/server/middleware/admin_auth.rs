//! Admin bearer-token check for mutating endpoints.
//!
//! Full request authentication is owned by the gateway in front of this
//! service; this guard only verifies the admin JWT on PATCH/DELETE.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::common::errors::AppError;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    role: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match check_admin(&state, &request) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

fn check_admin(state: &AppState, request: &Request) -> Result<(), AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    let algorithm = state
        .kernel
        .config
        .jwt_algorithm
        .parse::<Algorithm>()
        .unwrap_or(Algorithm::HS256);

    let decoded = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.kernel.config.jwt_secret.as_bytes()),
        &Validation::new(algorithm),
    )
    .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?;

    if decoded.claims.role.as_deref() != Some("admin") {
        return Err(AppError::Unauthorized("admin role required".into()));
    }
    Ok(())
}
