//! Per-request correlation ids.
//!
//! Each request gets a UUID (or reuses the caller's `X-Request-ID`),
//! carried in a task-local so error responses and logs share the same id,
//! and echoed back in the response header.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// The current request's correlation id, if inside a request scope.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header_id = request_id.clone();
    let span = tracing::info_span!("request", request_id = %request_id);

    let mut response = REQUEST_ID
        .scope(request_id, async move {
            tracing::Instrument::instrument(next.run(request), span).await
        })
        .await;

    if let Ok(header) = HeaderValue::from_str(&header_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_id_is_scoped_to_the_task() {
        assert!(current_request_id().is_none());
        REQUEST_ID
            .scope("abc".to_string(), async {
                assert_eq!(current_request_id().as_deref(), Some("abc"));
            })
            .await;
        assert!(current_request_id().is_none());
    }
}
