//! Current-weather lookups for the weather tool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::ToolError;

/// Public Open-Meteo forecast endpoint
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";

const WEATHER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Looks up current conditions for a coordinate pair.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<Value, ToolError>;
}

/// Weather provider backed by the Open-Meteo forecast API.
#[derive(Debug, Clone)]
pub struct OpenMeteoWeather {
    client: reqwest::Client,
    api_url: String,
}

impl OpenMeteoWeather {
    pub fn new(api_url: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(WEATHER_REQUEST_TIMEOUT)
            .user_agent(concat!("voicekb-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Weather(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoWeather {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<Value, ToolError> {
        debug!("Fetching weather for {}, {}", latitude, longitude);

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Weather(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Weather(format!(
                "weather API returned {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Weather(format!("invalid weather response: {e}")))?;

        Ok(json!({ "weather_data": body }))
    }
}

/// Read a coordinate that may be given as a JSON number or a numeric string.
pub(crate) fn parse_coordinate(input: &Value, field: &str, limit: f64) -> Result<f64, ToolError> {
    let value = match input.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => {
            return Err(ToolError::InvalidInput(format!(
                "missing required field '{field}'"
            )));
        }
    };

    match value {
        Some(v) if v.is_finite() && v.abs() <= limit => Ok(v),
        Some(v) => Err(ToolError::InvalidInput(format!(
            "'{field}' must be between -{limit} and {limit}, got {v}"
        ))),
        None => Err(ToolError::InvalidInput(format!(
            "'{field}' must be a number"
        ))),
    }
}
