//! Session WebSocket message types
//!
//! Clients drive a session with JSON text frames tagged by `type`. Binary
//! frames carry raw PCM16 audio at 16 kHz and are equivalent to `audioInput`.
//! Everything the session publishes is forwarded as a serialized
//! [`ContentEvent`].

use serde::{Deserialize, Serialize};

use crate::core::codec::ContentEvent;
use crate::core::knowledge::KnowledgeSource;

/// Maximum allowed size for a system prompt (100 KB)
pub const MAX_SYSTEM_PROMPT_SIZE: usize = 100 * 1024;

/// Maximum allowed size for one base64 audio chunk (1 MB)
pub const MAX_AUDIO_CHUNK_SIZE: usize = 1024 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Commands sent by the client.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionIncomingMessage {
    /// Open the prompt, optionally choosing the knowledge source
    PromptStart {
        #[serde(default)]
        knowledge_source: Option<String>,
    },

    /// System instructions; the configured default is used when absent
    SystemPrompt {
        #[serde(default)]
        content: Option<String>,
    },

    /// Open the user audio block
    AudioStart,

    /// Base64 PCM16 audio chunk
    AudioInput { data: String },

    /// End the conversation and close the session
    StopAudio,

    /// Switch the knowledge source for later tool calls
    SetKnowledgeSource { source: String },
}

impl SessionIncomingMessage {
    /// Reject oversized payloads before they reach the session.
    pub fn validate_size(&self) -> Result<(), String> {
        match self {
            SessionIncomingMessage::SystemPrompt {
                content: Some(content),
            } if content.len() > MAX_SYSTEM_PROMPT_SIZE => Err(format!(
                "System prompt too large: {} bytes (max {} bytes)",
                content.len(),
                MAX_SYSTEM_PROMPT_SIZE
            )),
            SessionIncomingMessage::AudioInput { data } if data.len() > MAX_AUDIO_CHUNK_SIZE => {
                Err(format!(
                    "Audio chunk too large: {} bytes (max {} bytes)",
                    data.len(),
                    MAX_AUDIO_CHUNK_SIZE
                ))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Notices produced by the gateway itself rather than by the session.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionOutgoingMessage {
    /// The session is registered and its upstream channel is open
    SessionCreated { session_id: String },

    /// Acknowledges `setKnowledgeSource`
    KnowledgeSourceSet { source: KnowledgeSource },
}

/// What the sender task writes to the socket.
#[derive(Debug)]
pub enum SessionMessageRoute {
    Outgoing(SessionOutgoingMessage),
    Event(ContentEvent),
    Close,
}

impl SessionMessageRoute {
    /// Error event not tied to any content block.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        SessionMessageRoute::Event(ContentEvent::error(message, Some(code.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        let msg: SessionIncomingMessage =
            serde_json::from_str(r#"{"type":"promptStart","knowledgeSource":"sharepoint"}"#)
                .unwrap();
        assert_eq!(
            msg,
            SessionIncomingMessage::PromptStart {
                knowledge_source: Some("sharepoint".into())
            }
        );

        let msg: SessionIncomingMessage = serde_json::from_str(r#"{"type":"promptStart"}"#).unwrap();
        assert_eq!(
            msg,
            SessionIncomingMessage::PromptStart {
                knowledge_source: None
            }
        );

        let msg: SessionIncomingMessage =
            serde_json::from_str(r#"{"type":"audioInput","data":"AAA="}"#).unwrap();
        assert_eq!(
            msg,
            SessionIncomingMessage::AudioInput {
                data: "AAA=".into()
            }
        );

        let msg: SessionIncomingMessage = serde_json::from_str(r#"{"type":"stopAudio"}"#).unwrap();
        assert_eq!(msg, SessionIncomingMessage::StopAudio);

        let msg: SessionIncomingMessage =
            serde_json::from_str(r#"{"type":"setKnowledgeSource","source":"bedrock"}"#).unwrap();
        assert_eq!(
            msg,
            SessionIncomingMessage::SetKnowledgeSource {
                source: "bedrock".into()
            }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<SessionIncomingMessage>(r#"{"type":"dance"}"#).is_err());
        assert!(
            serde_json::from_str::<SessionIncomingMessage>(r#"{"type":"audioInput"}"#).is_err()
        );
    }

    #[test]
    fn test_validate_size() {
        let big = SessionIncomingMessage::SystemPrompt {
            content: Some("x".repeat(MAX_SYSTEM_PROMPT_SIZE + 1)),
        };
        assert!(big.validate_size().unwrap_err().contains("System prompt too large"));

        let ok = SessionIncomingMessage::SystemPrompt { content: None };
        assert!(ok.validate_size().is_ok());
    }

    #[test]
    fn test_outgoing_serialization() {
        let msg = SessionOutgoingMessage::SessionCreated {
            session_id: "s-1".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "sessionCreated", "sessionId": "s-1"})
        );

        let msg = SessionOutgoingMessage::KnowledgeSourceSet {
            source: KnowledgeSource::Sharepoint,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "knowledgeSourceSet", "source": "sharepoint"})
        );
    }
}
