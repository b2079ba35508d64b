use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AudioFrame, CodecError};

/// Kind of a [`ContentEvent`], used for subscriptions and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    ContentStart,
    TextOutput,
    AudioOutput,
    ToolUse,
    ToolResult,
    ContentEnd,
    StreamComplete,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ContentStart,
        EventKind::TextOutput,
        EventKind::AudioOutput,
        EventKind::ToolUse,
        EventKind::ToolResult,
        EventKind::ContentEnd,
        EventKind::StreamComplete,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContentStart => "contentStart",
            EventKind::TextOutput => "textOutput",
            EventKind::AudioOutput => "audioOutput",
            EventKind::ToolUse => "toolUse",
            EventKind::ToolResult => "toolResult",
            EventKind::ContentEnd => "contentEnd",
            EventKind::StreamComplete => "streamComplete",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CodecError::UnknownEventKind(s.to_string()))
    }
}

/// Type tag of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Audio,
    Text,
    Tool,
}

/// Speaker of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// An event delivered by a session to its subscribers.
///
/// Every variant except `StreamComplete` correlates to a content block through
/// `content_id`. Errors raised outside any block (admission, transport) carry no id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentEvent {
    ContentStart {
        content_id: String,
        content_type: ContentType,
        role: Role,
    },
    TextOutput {
        content_id: String,
        role: Role,
        content: String,
    },
    AudioOutput {
        content_id: String,
        content: AudioFrame,
    },
    ToolUse {
        content_id: String,
        tool_name: String,
        tool_use_id: String,
        input: Value,
    },
    ToolResult {
        content_id: String,
        tool_use_id: String,
        result: Value,
    },
    ContentEnd {
        content_id: String,
        content_type: ContentType,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
    StreamComplete,
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        content_id: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ContentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContentEvent::ContentStart { .. } => EventKind::ContentStart,
            ContentEvent::TextOutput { .. } => EventKind::TextOutput,
            ContentEvent::AudioOutput { .. } => EventKind::AudioOutput,
            ContentEvent::ToolUse { .. } => EventKind::ToolUse,
            ContentEvent::ToolResult { .. } => EventKind::ToolResult,
            ContentEvent::ContentEnd { .. } => EventKind::ContentEnd,
            ContentEvent::StreamComplete => EventKind::StreamComplete,
            ContentEvent::Error { .. } => EventKind::Error,
        }
    }

    pub fn content_id(&self) -> Option<&str> {
        match self {
            ContentEvent::ContentStart { content_id, .. }
            | ContentEvent::TextOutput { content_id, .. }
            | ContentEvent::AudioOutput { content_id, .. }
            | ContentEvent::ToolUse { content_id, .. }
            | ContentEvent::ToolResult { content_id, .. }
            | ContentEvent::ContentEnd { content_id, .. } => Some(content_id),
            ContentEvent::Error { content_id, .. } => content_id.as_deref(),
            ContentEvent::StreamComplete => None,
        }
    }

    /// Error event not tied to a content block.
    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        ContentEvent::Error {
            content_id: None,
            message: message.into(),
            details,
        }
    }
}
