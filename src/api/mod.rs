//! HTTP API Module
//!
//! This module contains:
//! - `state`: Shared application state
//! - `handlers`: Route handlers for find, grab, health and info
//! - `wire`: Response and error bodies

mod handlers;
mod state;
pub mod wire;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/v1/find", post(handlers::find_proxies))
        .route("/api/v1/grab", post(handlers::grab_proxies))
        .with_state(state)
}
