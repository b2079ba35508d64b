use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Merge environment configuration (base) with optional YAML overrides.
///
/// Any value present in the YAML file replaces the one derived from
/// environment variables or defaults.
pub(crate) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else {
                match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) if tls.enabled.is_none() => {}
                    _ => {
                        return Err(
                            "TLS configuration requires both cert_path and key_path".into()
                        );
                    }
                }
            }
        }
    }

    if let Some(aws) = yaml.aws {
        if let Some(region) = aws.region {
            config.aws_region = region;
        }
        if let Some(key) = aws.access_key_id {
            config.aws_access_key_id = Some(key);
        }
        if let Some(secret) = aws.secret_access_key {
            config.aws_secret_access_key = Some(secret);
        }
    }

    if let Some(kb) = yaml.knowledge_base {
        if let Some(id) = kb.id {
            config.knowledge_base_id = id;
        }
        if let Some(arn) = kb.model_arn {
            config.knowledge_base_model_arn = arn;
        }
    }

    if let Some(upstream) = yaml.upstream {
        if let Some(url) = upstream.url {
            config.upstream_url = url;
        }
        if let Some(key) = upstream.api_key {
            config.upstream_api_key = Some(key);
        }
        if let Some(voice) = upstream.voice_id {
            config.voice_id = voice;
        }
        if let Some(prompt) = upstream.system_prompt {
            config.system_prompt = Some(prompt);
        }
        if let Some(inference) = upstream.inference {
            if let Some(max_tokens) = inference.max_tokens {
                config.max_tokens = max_tokens;
            }
            if let Some(top_p) = inference.top_p {
                config.top_p = top_p;
            }
            if let Some(temperature) = inference.temperature {
                config.temperature = temperature;
            }
        }
    }

    if let Some(sessions) = yaml.sessions {
        if let Some(limit) = sessions.max_concurrent_streams {
            config.max_concurrent_streams = limit;
        }
        if let Some(idle) = sessions.idle_timeout_seconds {
            config.idle_timeout_seconds = idle;
        }
        if let Some(interval) = sessions.reaper_interval_seconds {
            config.reaper_interval_seconds = interval;
        }
        if let Some(close) = sessions.close_timeout_ms {
            config.close_timeout_ms = close;
        }
        if let Some(capacity) = sessions.audio_queue_capacity {
            config.audio_queue_capacity = capacity;
        }
        if let Some(buffer) = sessions.subscriber_buffer {
            config.subscriber_buffer = buffer;
        }
    }

    if let Some(documents) = yaml.documents {
        if let Some(dir) = documents.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = documents.source_dir {
            config.documents_dir = PathBuf::from(dir);
        }
        if let Some(max) = documents.max_results {
            config.search_max_results = max;
        }
    }

    if let Some(url) = yaml.tools.and_then(|tools| tools.weather_api_url) {
        config.weather_api_url = url;
    }

    if let Some(origins) = yaml.security.and_then(|security| security.cors_allowed_origins) {
        config.cors_allowed_origins = Some(origins);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{ServerYaml, SessionsYaml, TlsYaml};
    use serial_test::serial;
    use std::env;

    fn cleanup_env_vars() {
        unsafe {
            for name in crate::config::env::ENV_VARS {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_merge_without_yaml_uses_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("VOICE_ID", "tiffany");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.voice_id, "tiffany");
        assert!(config.knowledge_base_id.is_empty());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_yaml_disables_env_tls() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/env/cert.pem");
            env::set_var("TLS_KEY_PATH", "/env/key.pem");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    enabled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert!(config.tls.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_session_limits() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            sessions: Some(SessionsYaml {
                close_timeout_ms: Some(500),
                subscriber_buffer: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.close_timeout_ms, 500);
        assert_eq!(config.subscriber_buffer, 8);
        assert_eq!(config.audio_queue_capacity, 256);

        cleanup_env_vars();
    }
}
