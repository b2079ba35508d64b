use super::ServerConfig;

/// Validate the merged configuration.
///
/// Checks that required values are present, that numeric limits are usable,
/// and that configured TLS files exist.
pub(crate) fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.knowledge_base_id.trim().is_empty() {
        return Err(
            "KNOWLEDGE_BASE_ID is required (set it in the environment or knowledge_base.id in YAML)"
                .into(),
        );
    }

    if !(config.upstream_url.starts_with("ws://") || config.upstream_url.starts_with("wss://")) {
        return Err(format!(
            "UPSTREAM_URL must be a ws:// or wss:// URL, got '{}'",
            config.upstream_url
        )
        .into());
    }

    let non_zero = [
        ("MAX_CONCURRENT_STREAMS", config.max_concurrent_streams as u64),
        ("SESSION_IDLE_TIMEOUT_SECONDS", config.idle_timeout_seconds),
        ("REAPER_INTERVAL_SECONDS", config.reaper_interval_seconds),
        ("SESSION_CLOSE_TIMEOUT_MS", config.close_timeout_ms),
        ("AUDIO_QUEUE_CAPACITY", config.audio_queue_capacity as u64),
        ("SUBSCRIBER_BUFFER", config.subscriber_buffer as u64),
        ("MAX_TOKENS", config.max_tokens as u64),
        ("SEARCH_MAX_RESULTS", config.search_max_results as u64),
    ];
    for (name, value) in non_zero {
        if value == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }

    if !(0.0..=1.0).contains(&config.top_p) {
        return Err(format!("TOP_P must be between 0 and 1, got {}", config.top_p).into());
    }
    if !(0.0..=1.0).contains(&config.temperature) {
        return Err(format!(
            "TEMPERATURE must be between 0 and 1, got {}",
            config.temperature
        )
        .into());
    }

    if config.aws_access_key_id.is_some() != config.aws_secret_access_key.is_some() {
        return Err(
            "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be provided together".into(),
        );
    }

    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file not found: {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
        }
    }

    Ok(())
}
