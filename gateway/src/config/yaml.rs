use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values given here override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   tls:
///     cert_path: "/etc/ssl/gateway.pem"
///     key_path: "/etc/ssl/gateway.key"
///
/// aws:
///   region: "us-east-1"
///   access_key_id: "AKIA..."
///   secret_access_key: "..."
///
/// knowledge_base:
///   id: "ABCDEFGHIJ"
///   model_arn: "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-pro-v1:0"
///
/// upstream:
///   url: "wss://model.example.com/v1/stream"
///   api_key: "..."
///   voice_id: "lupe"
///   system_prompt: "You are a helpful assistant."
///   inference:
///     max_tokens: 1024
///     top_p: 0.9
///     temperature: 0.7
///
/// sessions:
///   max_concurrent_streams: 10
///   idle_timeout_seconds: 300
///   reaper_interval_seconds: 60
///   close_timeout_ms: 3000
///   audio_queue_capacity: 256
///   subscriber_buffer: 256
///
/// documents:
///   data_dir: "./data"
///   source_dir: "./documents"
///   max_results: 5
///
/// tools:
///   weather_api_url: "https://api.open-meteo.com/v1/forecast"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub aws: Option<AwsYaml>,
    pub knowledge_base: Option<KnowledgeBaseYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub sessions: Option<SessionsYaml>,
    pub documents: Option<DocumentsYaml>,
    pub tools: Option<ToolsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AwsYaml {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KnowledgeBaseYaml {
    pub id: Option<String>,
    pub model_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub system_prompt: Option<String>,
    pub inference: Option<InferenceYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InferenceYaml {
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionsYaml {
    pub max_concurrent_streams: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub reaper_interval_seconds: Option<u64>,
    pub close_timeout_ms: Option<u64>,
    pub audio_queue_capacity: Option<usize>,
    pub subscriber_buffer: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DocumentsYaml {
    pub data_dir: Option<String>,
    pub source_dir: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub weather_api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
