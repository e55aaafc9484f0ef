//! Route definitions for the Optics Back-Office API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - inventory ledger
        .nest("/inventory", inventory_routes(state))
}

/// Inventory routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Stock records
        .route(
            "/stock",
            get(handlers::list_stock).post(handlers::create_stock),
        )
        .route(
            "/stock/:id",
            get(handlers::get_stock)
                .put(handlers::update_stock)
                .delete(handlers::void_stock),
        )
        .route("/stock/:id/entries", get(handlers::list_stock_entries))
        .route("/stock/:id/reconcile", get(handlers::reconcile_stock))
        // Movements
        .route("/movements", post(handlers::record_movement))
        .route("/movements/:entry_id", get(handlers::get_movement))
        .route(
            "/movements/:entry_id/reverse",
            post(handlers::reverse_movement),
        )
        // Alerts
        .route("/alerts", get(handlers::list_alerts))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
