pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod validation;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::ports::Ledger;
use crate::services::{LedgerReconciler, RoleDirectory};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub reconciler: Arc<LedgerReconciler>,
    pub roles: Arc<RoleDirectory>,
}

impl AppState {
    pub fn new(ledger: Arc<dyn Ledger>, roles: Arc<RoleDirectory>) -> Self {
        Self {
            reconciler: Arc::new(LedgerReconciler::new(ledger.clone())),
            ledger,
            roles,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/products/:id/history", get(handlers::products::product_history))
        .route("/history", get(handlers::history::global_history))
        .route("/users", get(handlers::users::list_users))
        .route("/stats", get(handlers::stats::activity_stats))
        .route("/fees/transport", get(handlers::products::transport_fee))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    middleware::request_logger_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
