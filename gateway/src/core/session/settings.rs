use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::tools::{DEFAULT_SYSTEM_PROMPT, default_tools};
use crate::core::upstream::{InferenceConfiguration, ToolSpec};

/// Per-session tunables shared by every session of the process.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub voice_id: String,
    pub inference: InferenceConfiguration,
    pub system_prompt: String,
    pub tools: Vec<ToolSpec>,
    /// Deadline for the graceful close sequence before a forced close
    pub close_timeout: Duration,
    /// Capacity of the outbound queue; `stream_audio` waits when it is full
    pub audio_queue_capacity: usize,
    /// Per-subscriber event buffer
    pub subscriber_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            voice_id: "lupe".to_string(),
            inference: InferenceConfiguration::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: default_tools(),
            close_timeout: Duration::from_millis(3000),
            audio_queue_capacity: 256,
            subscriber_buffer: 256,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            voice_id: config.voice_id.clone(),
            inference: InferenceConfiguration {
                max_tokens: config.max_tokens,
                top_p: config.top_p,
                temperature: config.temperature,
            },
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            tools: default_tools(),
            close_timeout: Duration::from_millis(config.close_timeout_ms),
            audio_queue_capacity: config.audio_queue_capacity,
            subscriber_buffer: config.subscriber_buffer,
        }
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn with_audio_queue_capacity(mut self, capacity: usize) -> Self {
        self.audio_queue_capacity = capacity.max(1);
        self
    }
}
