//! Request middleware: correlation ids, payload size limits, admin auth.

pub mod admin_auth;
pub mod payload_limit;
pub mod request_id;

pub use admin_auth::require_admin;
pub use payload_limit::enforce_payload_limit;
pub use request_id::{current_request_id, request_id_middleware};
