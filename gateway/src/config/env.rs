use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};
use crate::core::knowledge::DEFAULT_MODEL_ARN;
use crate::core::tools::DEFAULT_WEATHER_API_URL;

pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const DEFAULT_AWS_REGION: &str = "us-east-1";
pub(crate) const DEFAULT_UPSTREAM_URL: &str = "ws://127.0.0.1:8081/v1/stream";
pub(crate) const DEFAULT_VOICE_ID: &str = "lupe";
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 1024;
pub(crate) const DEFAULT_TOP_P: f32 = 0.9;
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.7;
pub(crate) const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 10;
pub(crate) const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 300;
pub(crate) const DEFAULT_REAPER_INTERVAL_SECONDS: u64 = 60;
pub(crate) const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 3000;
pub(crate) const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 256;
pub(crate) const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;
pub(crate) const DEFAULT_DATA_DIR: &str = "./data";
pub(crate) const DEFAULT_DOCUMENTS_DIR: &str = "./documents";
pub(crate) const DEFAULT_SEARCH_MAX_RESULTS: usize = 5;

/// Every environment variable read by [`load_from_env`]
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) const ENV_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "TLS_CERT_PATH",
    "TLS_KEY_PATH",
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "KNOWLEDGE_BASE_ID",
    "KNOWLEDGE_BASE_MODEL_ARN",
    "UPSTREAM_URL",
    "UPSTREAM_API_KEY",
    "VOICE_ID",
    "MAX_TOKENS",
    "TOP_P",
    "TEMPERATURE",
    "SYSTEM_PROMPT",
    "MAX_CONCURRENT_STREAMS",
    "SESSION_IDLE_TIMEOUT_SECONDS",
    "REAPER_INTERVAL_SECONDS",
    "SESSION_CLOSE_TIMEOUT_MS",
    "AUDIO_QUEUE_CAPACITY",
    "SUBSCRIBER_BUFFER",
    "DATA_DIR",
    "DOCUMENTS_DIR",
    "SEARCH_MAX_RESULTS",
    "WEATHER_API_URL",
    "CORS_ALLOWED_ORIGINS",
];

/// Read a variable, treating empty or whitespace-only values as unset.
pub(crate) fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse a variable, falling back to `default` when unset.
pub(crate) fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}")),
        None => Ok(default),
    }
}

/// Build the configuration from environment variables and defaults.
///
/// Required values that are missing (such as `KNOWLEDGE_BASE_ID`) are left
/// empty here and reported by validation, so a YAML file can still supply them.
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    Ok(ServerConfig {
        host: env_string("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env_parse("PORT", DEFAULT_PORT)?,
        tls,
        aws_region: env_string("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
        aws_access_key_id: env_string("AWS_ACCESS_KEY_ID"),
        aws_secret_access_key: env_string("AWS_SECRET_ACCESS_KEY"),
        knowledge_base_id: env_string("KNOWLEDGE_BASE_ID").unwrap_or_default(),
        knowledge_base_model_arn: env_string("KNOWLEDGE_BASE_MODEL_ARN")
            .unwrap_or_else(|| DEFAULT_MODEL_ARN.to_string()),
        upstream_url: env_string("UPSTREAM_URL")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
        upstream_api_key: env_string("UPSTREAM_API_KEY"),
        voice_id: env_string("VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
        max_tokens: env_parse("MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        top_p: env_parse("TOP_P", DEFAULT_TOP_P)?,
        temperature: env_parse("TEMPERATURE", DEFAULT_TEMPERATURE)?,
        system_prompt: env_string("SYSTEM_PROMPT"),
        max_concurrent_streams: env_parse(
            "MAX_CONCURRENT_STREAMS",
            DEFAULT_MAX_CONCURRENT_STREAMS,
        )?,
        idle_timeout_seconds: env_parse(
            "SESSION_IDLE_TIMEOUT_SECONDS",
            DEFAULT_IDLE_TIMEOUT_SECONDS,
        )?,
        reaper_interval_seconds: env_parse(
            "REAPER_INTERVAL_SECONDS",
            DEFAULT_REAPER_INTERVAL_SECONDS,
        )?,
        close_timeout_ms: env_parse("SESSION_CLOSE_TIMEOUT_MS", DEFAULT_CLOSE_TIMEOUT_MS)?,
        audio_queue_capacity: env_parse("AUDIO_QUEUE_CAPACITY", DEFAULT_AUDIO_QUEUE_CAPACITY)?,
        subscriber_buffer: env_parse("SUBSCRIBER_BUFFER", DEFAULT_SUBSCRIBER_BUFFER)?,
        data_dir: PathBuf::from(
            env_string("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        ),
        documents_dir: PathBuf::from(
            env_string("DOCUMENTS_DIR").unwrap_or_else(|| DEFAULT_DOCUMENTS_DIR.to_string()),
        ),
        search_max_results: env_parse("SEARCH_MAX_RESULTS", DEFAULT_SEARCH_MAX_RESULTS)?,
        weather_api_url: env_string("WEATHER_API_URL")
            .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
        cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
    })
}
