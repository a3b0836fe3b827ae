//! idrec-identify library - identity reconciliation service
//!
//! Resolves partial contact observations (email, phone number, or both) to
//! a single customer identity and serves the consolidated view over HTTP.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod identity;

pub use identity::{ConsolidatedContact, IdentityEngine};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: IdentityEngine,
}

impl AppState {
    pub fn new(engine: IdentityEngine) -> Self {
        Self { engine }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::identify_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}
