//! Payload size enforcement for the webhook surface.
//!
//! The Content-Length check runs before any body read or database work;
//! the bounded body read in the webhook route covers senders that lie or
//! stream without a length.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::common::errors::AppError;
use crate::server::app::AppState;

pub async fn enforce_payload_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.kernel.config.max_payload_size_bytes();

    if let Some(length) = content_length(&request) {
        if length > limit {
            tracing::warn!(content_length = length, limit, "payload rejected up front");
            return AppError::PayloadTooLarge {
                limit_mb: state.kernel.config.max_payload_size_mb,
            }
            .into_response();
        }
    }

    next.run(request).await
}

fn content_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
