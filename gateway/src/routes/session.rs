//! Session WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::session::session_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the session WebSocket router
///
/// # Endpoint
///
/// `GET /session` - WebSocket upgrade; one connection carries one duplex session
///
/// # Example
///
/// ```json
/// // Server announces the session
/// {"type": "sessionCreated", "sessionId": "..."}
///
/// // Client opens the prompt and starts speaking
/// {"type": "promptStart", "knowledgeSource": "bedrock"}
/// {"type": "systemPrompt"}
/// {"type": "audioStart"}
/// {"type": "audioInput", "data": "<base64 PCM16 16 kHz mono>"}
///
/// // Client ends the conversation
/// {"type": "stopAudio"}
/// ```
pub fn create_session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(session_handler))
        .layer(TraceLayer::new_for_http())
}
