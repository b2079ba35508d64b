//! Admin HTTP handlers: health, live sessions and the document index.

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(json!({
        "status": "ok",
        "timestamp": timestamp,
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Registry counters and a snapshot of every live session
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "stats": state.registry.stats(),
        "sessions": state.registry.snapshots(),
    }))
}

/// Rebuild the document index from the configured document source
pub async fn refresh_documents(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    info!("Document index refresh requested");
    let summary = state
        .document_index
        .refresh(state.document_source.as_ref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Document index updated successfully",
        "updated": summary.updated,
        "total": summary.total,
    })))
}

pub async fn documents_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.document_index.status().await;
    let formatted_size = format_bytes(status.total_size);

    Json(json!({
        "success": true,
        "status": {
            "documentCount": status.document_count,
            "lastSync": status.last_sync.and_then(|t| t.format(&Rfc3339).ok()),
            "totalSize": status.total_size,
            "formattedSize": formatted_size,
        },
    }))
}

pub async fn list_documents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "documents": state.document_index.document_names().await,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file_name: String,
    pub excerpt: String,
    pub relevance_score: usize,
}

/// Keyword search over the document index
pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> AppResult<impl IntoResponse> {
    let query = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Query parameter is required and must be a string".to_string())
        })?;
    let max_results = request
        .max_results
        .unwrap_or(state.config.search_max_results)
        .max(1);

    let results: Vec<SearchResult> = state
        .document_index
        .search_documents(&query, max_results)
        .await
        .into_iter()
        .map(|hit| SearchResult {
            file_name: hit.name,
            excerpt: hit.excerpt,
            relevance_score: hit.score,
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "query": query,
        "results": results,
    })))
}

/// Human-readable size with up to two decimals, e.g. `1.5 KB`.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 7] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
