//! Configuration module for the voice knowledge gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voicekb_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS)
/// - AWS credentials and the managed knowledge base
/// - Upstream model endpoint and inference parameters
/// - Session limits and timeouts
/// - Document index locations
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // AWS settings
    /// AWS region of the knowledge base (e.g., "us-east-1")
    pub aws_region: String,
    /// Static access key; the default credential chain is used when absent
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,

    // Managed knowledge base
    pub knowledge_base_id: String,
    /// Foundation model used to generate knowledge base answers
    pub knowledge_base_model_arn: String,

    // Upstream streaming model
    /// WebSocket endpoint of the streaming speech model (ws:// or wss://)
    pub upstream_url: String,
    pub upstream_api_key: Option<String>,
    /// Voice used for synthesized replies
    pub voice_id: String,
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
    /// Overrides the built-in system instructions
    pub system_prompt: Option<String>,

    // Session limits
    /// Maximum sessions holding an upstream stream at once
    /// Default: 10
    pub max_concurrent_streams: usize,
    /// Idle time after which the reaper closes a session
    /// Default: 300
    pub idle_timeout_seconds: u64,
    /// Reaper sweep period
    /// Default: 60
    pub reaper_interval_seconds: u64,
    /// Deadline for a graceful close before it is forced
    /// Default: 3000
    pub close_timeout_ms: u64,
    /// Outbound queue capacity per session
    /// Default: 256
    pub audio_queue_capacity: usize,
    /// Event buffer per subscriber
    /// Default: 256
    pub subscriber_buffer: usize,

    // Document index
    /// Directory holding the persisted document index
    pub data_dir: PathBuf,
    /// Directory the document index is refreshed from
    pub documents_dir: PathBuf,
    /// Maximum hits returned by document search
    pub search_max_results: usize,

    // Tools
    pub weather_api_url: String,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

/// Built-in defaults. `knowledge_base_id` is left empty and must be supplied
/// before the configuration validates.
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::DEFAULT_HOST.to_string(),
            port: env::DEFAULT_PORT,
            tls: None,
            aws_region: env::DEFAULT_AWS_REGION.to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            knowledge_base_id: String::new(),
            knowledge_base_model_arn: crate::core::knowledge::DEFAULT_MODEL_ARN.to_string(),
            upstream_url: env::DEFAULT_UPSTREAM_URL.to_string(),
            upstream_api_key: None,
            voice_id: env::DEFAULT_VOICE_ID.to_string(),
            max_tokens: env::DEFAULT_MAX_TOKENS,
            top_p: env::DEFAULT_TOP_P,
            temperature: env::DEFAULT_TEMPERATURE,
            system_prompt: None,
            max_concurrent_streams: env::DEFAULT_MAX_CONCURRENT_STREAMS,
            idle_timeout_seconds: env::DEFAULT_IDLE_TIMEOUT_SECONDS,
            reaper_interval_seconds: env::DEFAULT_REAPER_INTERVAL_SECONDS,
            close_timeout_ms: env::DEFAULT_CLOSE_TIMEOUT_MS,
            audio_queue_capacity: env::DEFAULT_AUDIO_QUEUE_CAPACITY,
            subscriber_buffer: env::DEFAULT_SUBSCRIBER_BUFFER,
            data_dir: PathBuf::from(env::DEFAULT_DATA_DIR),
            documents_dir: PathBuf::from(env::DEFAULT_DOCUMENTS_DIR),
            search_max_results: env::DEFAULT_SEARCH_MAX_RESULTS,
            weather_api_url: crate::core::tools::DEFAULT_WEATHER_API_URL.to_string(),
            cors_allowed_origins: None,
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
/// This ensures sensitive data is cleared from memory immediately after use.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.aws_access_key_id {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.aws_secret_access_key {
            secret.zeroize();
        }
        if let Some(ref mut key) = self.upstream_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The .env file is loaded in main.rs before this is called, so its values
    /// are visible here unless overridden by real environment variables.
    ///
    /// # Errors
    /// Returns an error if an environment variable has an invalid format or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Load YAML configuration
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        // Merge environment variables (base) with YAML overrides
        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Static AWS credentials, when both halves are configured.
    pub fn aws_credentials(&self) -> Option<(&str, &str)> {
        match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
