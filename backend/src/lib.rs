//! Optics Back-Office - inventory ledger backend
//!
//! Stock records per (product, location, variant), a movement ledger that
//! explains every change in quantity, and a low-stock alert projection.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use audit::AuditHook;
use services::{AlertService, LedgerService, StockService};
use store::{CatalogLookup, LedgerStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub audit: AuditHook,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn ledger(&self) -> LedgerService {
        LedgerService::new(
            self.store.clone(),
            self.audit.clone(),
            self.config.ledger.clone(),
        )
    }

    pub fn stock(&self) -> StockService {
        StockService::new(
            self.store.clone(),
            self.catalog.clone(),
            self.audit.clone(),
            self.config.ledger.clone(),
        )
    }

    pub fn alerts(&self) -> AlertService {
        AlertService::new(self.store.clone())
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Optics Back-Office Inventory API v1.0"
}
