//! Stream capacity check for session WebSocket upgrades
//!
//! Rejects a WebSocket upgrade with 503 before the handshake when every
//! upstream stream slot is already taken, so clients learn about a full
//! gateway without opening a socket. Admission itself still happens when the
//! session is initiated; this check is only a fast path.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use voicekb_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/session", get(session_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::AppState;

/// Client address, inserted into request extensions when the server exposes
/// connect info.
#[derive(Clone, Debug)]
pub struct ClientIp(pub IpAddr);

/// Middleware that enforces the concurrent stream limit for WebSocket upgrades.
///
/// Non-WebSocket requests pass through without checks.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Only apply limits to WebSocket upgrade requests
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if state.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server is shutting down.",
        )
            .into_response();
    }

    let stats = state.registry.stats();
    if stats.streams_in_use >= stats.max_concurrent_streams {
        tracing::warn!(
            ip = ?client_ip,
            "Rejecting connection: {}/{} streams in use",
            stats.streams_in_use,
            stats.max_concurrent_streams
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server at capacity. Please try again later.",
        )
            .into_response();
    }

    if let Some(ip) = client_ip {
        request.extensions_mut().insert(ClientIp(ip));
    }
    next.run(request).await
}
