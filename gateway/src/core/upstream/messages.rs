//! JSON event protocol spoken with the streaming model.
//!
//! Every frame is a text message of the form `{"event": {"<kind>": {...}}}`.
//! Client events open and close a session, a prompt and the content blocks
//! nested in it. Server events stream model output back, one content block at a
//! time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::codec::{
    AudioFrame, CHANNEL_COUNT, CodecError, CodecResult, ContentEvent, ContentType,
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, Role, SAMPLE_SIZE_BITS,
};

// =============================================================================
// Configuration payloads
// =============================================================================

/// Sampling parameters for the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for InferenceConfiguration {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            top_p: 0.9,
            temperature: 0.7,
        }
    }
}

/// PCM audio stream description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfiguration {
    pub media_type: String,
    pub sample_rate_hertz: u32,
    pub sample_size_bits: u16,
    pub channel_count: u16,
    pub audio_type: String,
    pub encoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl AudioConfiguration {
    /// Microphone audio sent by the client.
    pub fn input() -> Self {
        Self {
            media_type: "audio/lpcm".to_string(),
            sample_rate_hertz: INPUT_SAMPLE_RATE,
            sample_size_bits: SAMPLE_SIZE_BITS,
            channel_count: CHANNEL_COUNT,
            audio_type: "SPEECH".to_string(),
            encoding: "base64".to_string(),
            voice_id: None,
        }
    }

    /// Speech synthesized by the model with the given voice.
    pub fn output(voice_id: impl Into<String>) -> Self {
        Self {
            sample_rate_hertz: OUTPUT_SAMPLE_RATE,
            voice_id: Some(voice_id.into()),
            ..Self::input()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfiguration {
    pub media_type: String,
}

impl MediaConfiguration {
    pub fn text() -> Self {
        Self {
            media_type: "text/plain".to_string(),
        }
    }

    pub fn json() -> Self {
        Self {
            media_type: "application/json".to_string(),
        }
    }
}

/// A tool declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON schema of a tool's input, carried as a serialized string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInputSchema {
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub tool_spec: ToolSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfiguration {
    pub tools: Vec<ToolDefinition>,
}

impl ToolConfiguration {
    pub fn new(specs: Vec<ToolSpec>) -> Self {
        Self {
            tools: specs
                .into_iter()
                .map(|tool_spec| ToolDefinition { tool_spec })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultInputConfiguration {
    pub tool_use_id: String,
    #[serde(rename = "type")]
    pub result_type: String,
    pub text_input_configuration: MediaConfiguration,
}

// =============================================================================
// Client events (gateway -> model)
// =============================================================================

/// Opens a content block inside the active prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStartEvent {
    pub prompt_name: String,
    pub content_name: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub interactive: bool,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_input_configuration: Option<MediaConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_input_configuration: Option<AudioConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result_input_configuration: Option<ToolResultInputConfiguration>,
}

impl ContentStartEvent {
    /// System instructions block.
    pub fn system_text(prompt_name: &str, content_name: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Text,
            interactive: true,
            role: Role::System,
            text_input_configuration: Some(MediaConfiguration::text()),
            audio_input_configuration: None,
            tool_result_input_configuration: None,
        }
    }

    /// Interactive user microphone block.
    pub fn user_audio(prompt_name: &str, content_name: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Audio,
            interactive: true,
            role: Role::User,
            text_input_configuration: None,
            audio_input_configuration: Some(AudioConfiguration::input()),
            tool_result_input_configuration: None,
        }
    }

    /// Block carrying the result of a tool invocation.
    pub fn tool_result(prompt_name: &str, content_name: &str, tool_use_id: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Tool,
            interactive: false,
            role: Role::Tool,
            text_input_configuration: None,
            audio_input_configuration: None,
            tool_result_input_configuration: Some(ToolResultInputConfiguration {
                tool_use_id: tool_use_id.to_string(),
                result_type: "TEXT".to_string(),
                text_input_configuration: MediaConfiguration::text(),
            }),
        }
    }
}

/// Events sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    SessionStart {
        inference_configuration: InferenceConfiguration,
    },
    PromptStart {
        prompt_name: String,
        text_output_configuration: MediaConfiguration,
        audio_output_configuration: AudioConfiguration,
        tool_use_output_configuration: MediaConfiguration,
        tool_configuration: ToolConfiguration,
    },
    ContentStart(ContentStartEvent),
    TextInput {
        prompt_name: String,
        content_name: String,
        content: String,
    },
    AudioInput {
        prompt_name: String,
        content_name: String,
        content: AudioFrame,
    },
    ToolResult {
        prompt_name: String,
        content_name: String,
        content: String,
    },
    ContentEnd {
        prompt_name: String,
        content_name: String,
    },
    PromptEnd {
        prompt_name: String,
    },
    SessionEnd {},
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a ClientEvent,
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SessionStart { .. } => "sessionStart",
            ClientEvent::PromptStart { .. } => "promptStart",
            ClientEvent::ContentStart(_) => "contentStart",
            ClientEvent::TextInput { .. } => "textInput",
            ClientEvent::AudioInput { .. } => "audioInput",
            ClientEvent::ToolResult { .. } => "toolResult",
            ClientEvent::ContentEnd { .. } => "contentEnd",
            ClientEvent::PromptEnd { .. } => "promptEnd",
            ClientEvent::SessionEnd {} => "sessionEnd",
        }
    }

    /// Serialize as a complete wire frame.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope { event: self })
    }
}

// =============================================================================
// Server events (model -> gateway)
// =============================================================================

#[derive(Deserialize)]
struct ServerEnvelope {
    event: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContentStart {
    content_id: String,
    #[serde(rename = "type")]
    content_type: ContentType,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTextOutput {
    content_id: String,
    #[serde(default)]
    role: Option<Role>,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAudioOutput {
    content_id: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToolUse {
    content_id: String,
    tool_name: String,
    tool_use_id: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContentEnd {
    content_id: String,
    #[serde(rename = "type")]
    content_type: ContentType,
    #[serde(default)]
    stop_reason: Option<String>,
}

fn payload<T: for<'de> Deserialize<'de>>(kind: &str, body: Value) -> CodecResult<T> {
    serde_json::from_value(body)
        .map_err(|e| CodecError::MalformedFrame(format!("invalid {kind} payload: {e}")))
}

/// Decode one server frame.
///
/// Returns `Ok(None)` for bookkeeping events that carry no content
/// (`completionStart`, `completionEnd`, `usageEvent`).
pub fn decode_server_event(text: &str) -> CodecResult<Option<ContentEvent>> {
    let envelope: ServerEnvelope = serde_json::from_str(text)
        .map_err(|e| CodecError::MalformedFrame(format!("invalid event envelope: {e}")))?;

    let Some((kind, body)) = envelope.event.into_iter().next() else {
        return Err(CodecError::MalformedFrame("empty event envelope".into()));
    };

    let event = match kind.as_str() {
        "contentStart" => {
            let p: WireContentStart = payload(&kind, body)?;
            ContentEvent::ContentStart {
                content_id: p.content_id,
                content_type: p.content_type,
                role: p.role.unwrap_or(Role::Assistant),
            }
        }
        "textOutput" => {
            let p: WireTextOutput = payload(&kind, body)?;
            ContentEvent::TextOutput {
                content_id: p.content_id,
                role: p.role.unwrap_or(Role::Assistant),
                content: p.content,
            }
        }
        "audioOutput" => {
            let p: WireAudioOutput = payload(&kind, body)?;
            ContentEvent::AudioOutput {
                content_id: p.content_id,
                content: AudioFrame::from_base64(&p.content, OUTPUT_SAMPLE_RATE)?,
            }
        }
        "toolUse" => {
            let p: WireToolUse = payload(&kind, body)?;
            // tool input arrives as a JSON document serialized into a string
            let input = match p.content {
                Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                None => Value::Object(Map::new()),
            };
            ContentEvent::ToolUse {
                content_id: p.content_id,
                tool_name: p.tool_name,
                tool_use_id: p.tool_use_id,
                input,
            }
        }
        "contentEnd" => {
            let p: WireContentEnd = payload(&kind, body)?;
            ContentEvent::ContentEnd {
                content_id: p.content_id,
                content_type: p.content_type,
                stop_reason: p.stop_reason,
            }
        }
        "completionStart" | "completionEnd" | "usageEvent" => return Ok(None),
        _ => return Err(CodecError::UnknownEventKind(kind)),
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(event: &ClientEvent) -> Value {
        serde_json::from_str(&event.to_wire().unwrap()).unwrap()
    }

    #[test]
    fn test_session_start_wire_format() {
        let event = ClientEvent::SessionStart {
            inference_configuration: InferenceConfiguration::default(),
        };
        let value = wire(&event);
        let config = &value["event"]["sessionStart"]["inferenceConfiguration"];
        assert_eq!(config["maxTokens"], 1024);
        assert!((config["topP"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((config["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_session_end_is_empty_object() {
        assert_eq!(
            wire(&ClientEvent::SessionEnd {}),
            json!({"event": {"sessionEnd": {}}})
        );
    }

    #[test]
    fn test_audio_content_start_wire_format() {
        let event = ClientEvent::ContentStart(ContentStartEvent::user_audio("p-1", "a-1"));
        assert_eq!(
            wire(&event),
            json!({"event": {"contentStart": {
                "promptName": "p-1",
                "contentName": "a-1",
                "type": "AUDIO",
                "interactive": true,
                "role": "USER",
                "audioInputConfiguration": {
                    "mediaType": "audio/lpcm",
                    "sampleRateHertz": 16000,
                    "sampleSizeBits": 16,
                    "channelCount": 1,
                    "audioType": "SPEECH",
                    "encoding": "base64"
                }
            }}})
        );
    }

    #[test]
    fn test_tool_result_content_start() {
        let event = ClientEvent::ContentStart(ContentStartEvent::tool_result("p", "c", "t-9"));
        let value = wire(&event);
        let start = &value["event"]["contentStart"];
        assert_eq!(start["type"], "TOOL");
        assert_eq!(start["role"], "TOOL");
        assert_eq!(start["interactive"], false);
        assert_eq!(start["toolResultInputConfiguration"]["toolUseId"], "t-9");
        assert_eq!(start["toolResultInputConfiguration"]["type"], "TEXT");
    }

    #[test]
    fn test_audio_input_is_base64() {
        let event = ClientEvent::AudioInput {
            prompt_name: "p".into(),
            content_name: "a".into(),
            content: AudioFrame::input(vec![1u8, 0, 2, 0]).unwrap(),
        };
        assert_eq!(wire(&event)["event"]["audioInput"]["content"], "AQACAA==");
    }

    #[test]
    fn test_output_audio_configuration_carries_voice() {
        let config = AudioConfiguration::output("lupe");
        assert_eq!(config.sample_rate_hertz, 24_000);
        assert_eq!(config.voice_id.as_deref(), Some("lupe"));
    }

    #[test]
    fn test_decode_text_output() {
        let frame = r#"{"event":{"textOutput":{"contentId":"c1","role":"ASSISTANT","content":"Hola"}}}"#;
        assert_eq!(
            decode_server_event(frame).unwrap(),
            Some(ContentEvent::TextOutput {
                content_id: "c1".into(),
                role: Role::Assistant,
                content: "Hola".into(),
            })
        );
    }

    #[test]
    fn test_decode_tool_use_parses_input() {
        let frame = json!({"event": {"toolUse": {
            "contentId": "c2",
            "toolName": "getWeatherTool",
            "toolUseId": "t1",
            "content": "{\"latitude\":\"40.4\",\"longitude\":\"-3.7\"}"
        }}})
        .to_string();

        match decode_server_event(&frame).unwrap() {
            Some(ContentEvent::ToolUse {
                tool_name, input, ..
            }) => {
                assert_eq!(tool_name, "getWeatherTool");
                assert_eq!(input["latitude"], "40.4");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_audio_output() {
        let frame = r#"{"event":{"audioOutput":{"contentId":"c3","content":"AAD//w=="}}}"#;
        match decode_server_event(frame).unwrap() {
            Some(ContentEvent::AudioOutput { content, .. }) => {
                assert_eq!(content.sample_rate(), OUTPUT_SAMPLE_RATE);
                assert_eq!(content.sample_count(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_odd_audio() {
        let frame = r#"{"event":{"audioOutput":{"contentId":"c3","content":"AAAA"}}}"#;
        assert!(matches!(
            decode_server_event(frame),
            Err(CodecError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_ignores_bookkeeping() {
        let frame = r#"{"event":{"usageEvent":{"totalTokens":42}}}"#;
        assert_eq!(decode_server_event(frame).unwrap(), None);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let frame = r#"{"event":{"somethingNew":{}}}"#;
        assert_eq!(
            decode_server_event(frame).unwrap_err(),
            CodecError::UnknownEventKind("somethingNew".into())
        );
    }

    #[test]
    fn test_decode_malformed_envelope() {
        assert!(matches!(
            decode_server_event("not json"),
            Err(CodecError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_server_event(r#"{"event":{}}"#),
            Err(CodecError::MalformedFrame(_))
        ));
    }
}
