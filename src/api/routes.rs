//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{admin::*, handlers::*};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))
        // Seamless provider callbacks; explicit OPTIONS so preflight
        // answers independently of provider routing
        .route(
            "/api/seamless/:provider",
            post(seamless_callback_handler).options(seamless_preflight_handler),
        )
        // Admin back-office
        .route("/api/admin/wallets", post(create_wallet_handler))
        .route("/api/admin/wallets/:user_id", get(get_wallet_handler))
        .route(
            "/api/admin/wallets/:user_id/adjust",
            post(adjust_balance_handler),
        )
        .route(
            "/api/admin/wallets/:user_id/freeze",
            post(freeze_wallet_handler),
        )
        .route(
            "/api/admin/wallets/:user_id/unfreeze",
            post(unfreeze_wallet_handler),
        )
        .route("/api/admin/rollback", post(rollback_handler))
        .route("/api/admin/audit", get(audit_log_handler))
        // Attach shared state
        .with_state(state)
}
