//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check, session listing and document index endpoints
//! - `session` - Duplex session WebSocket

pub mod api;
pub mod session;

// Re-export commonly used handlers for convenient access
pub use session::session_handler;
