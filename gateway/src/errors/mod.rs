//! Error types shared across the gateway.
//!
//! - `session_error`: the session taxonomy surfaced to clients and callers
//! - `app_error`: HTTP-facing errors rendered by axum handlers

pub mod app_error;
pub mod session_error;

pub use app_error::{AppError, AppResult};
pub use session_error::{SessionError, SessionResult};
