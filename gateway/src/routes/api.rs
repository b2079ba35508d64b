use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the admin API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/sessions", get(api::list_sessions))
        .route("/api/documents", get(api::list_documents))
        .route("/api/documents/refresh", post(api::refresh_documents))
        .route("/api/documents/status", get(api::documents_status))
        .route("/api/documents/search", post(api::search_documents))
        .layer(TraceLayer::new_for_http())
}
