//! All routes for the HTTP API.

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{api, AppState};

pub(crate) mod contact;
pub mod health;

/// Builds the API router.
///
/// The contact route accepts every method so that rejected methods still get CORS headers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/contact", any(contact::handle))
        .route("/api/health", get(health::get))
        .fallback(|| async { api::Error::RouteNotFound })
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
