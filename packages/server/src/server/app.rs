//! Application setup and router configuration.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::AppKernel;
use crate::realtime::ConnectionManager;
use crate::server::middleware::{
    enforce_payload_limit, request_id_middleware, require_admin,
};
use crate::server::routes::{applications, health_handler, webhooks, ws};
use crate::services::{CommandService, QueryService};

#[derive(Clone)]
pub struct AppState {
    pub kernel: AppKernel,
    pub commands: CommandService,
    pub queries: QueryService,
    pub manager: ConnectionManager,
}

impl AppState {
    pub fn new(kernel: AppKernel, manager: ConnectionManager) -> Self {
        AppState {
            commands: CommandService::new(kernel.clone()),
            queries: QueryService::new(kernel.clone()),
            kernel,
            manager,
        }
    }
}

pub fn build_app(kernel: AppKernel, manager: ConnectionManager) -> Router {
    let state = AppState::new(kernel, manager);

    let admin_routes = Router::new()
        .route(
            "/applications/:id",
            axum::routing::patch(applications::update_application)
                .delete(applications::delete_application),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let webhook_routes = Router::new()
        .route("/webhooks/bank-confirmation", post(webhooks::bank_confirmation))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_payload_limit,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/applications",
            post(applications::create_application).get(applications::list_applications),
        )
        .route(
            "/applications/stats/country/:code",
            get(applications::country_statistics),
        )
        .route("/applications/:id", get(applications::get_application))
        .route("/applications/:id/audit", get(applications::get_audit_logs))
        .route(
            "/applications/:id/pending-jobs",
            get(applications::get_pending_jobs),
        )
        .merge(admin_routes)
        .merge(webhook_routes)
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
