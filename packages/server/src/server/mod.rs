//! HTTP surface: axum application, routes and middleware.

pub mod app;
pub mod middleware;
pub mod routes;

pub use app::{build_app, AppState};
