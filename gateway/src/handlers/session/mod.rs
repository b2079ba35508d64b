//! Duplex session WebSocket handlers
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **promptStart**: Open the prompt (`knowledgeSource`: `bedrock` | `sharepoint`)
//! - **systemPrompt**: System instructions (`content`, optional)
//! - **audioStart**: Open the user audio block
//! - **audioInput**: Base64 PCM16 16 kHz mono audio (`data`)
//! - **stopAudio**: End the conversation and close the session
//! - **setKnowledgeSource**: Switch the knowledge source (`source`)
//! - **Binary frames**: Raw PCM16 16 kHz mono audio
//!
//! ## Server → Client
//!
//! - **sessionCreated**: Session established (`sessionId`)
//! - **knowledgeSourceSet**: Knowledge source changed
//! - **contentStart** / **textOutput** / **audioOutput** / **contentEnd**: Model output
//! - **toolUse** / **toolResult**: Tool round trips
//! - **error**: Protocol or session error (`message`, `details` holds the error code)
//! - **streamComplete**: The session is closed; the socket closes next

mod handler;
pub mod messages;

pub use handler::session_handler;
