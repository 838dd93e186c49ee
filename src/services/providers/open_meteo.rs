/// Open-Meteo weather provider
///
/// Uses the keyless forecast endpoint with `current=temperature_2m,weather_code`
/// and translates WMO weather codes into short condition labels.
use std::time::Duration;

use reqwest::Client as HttpClient;

use crate::{
    error::{AppError, AppResult},
    services::providers::{WeatherProvider, WeatherReading},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct OpenMeteoProvider {
    http_client: HttpClient,
    api_url: String,
}

impl OpenMeteoProvider {
    pub fn new(api_url: String) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Maps a WMO weather interpretation code to a condition label
    fn describe_weather_code(code: i64) -> &'static str {
        match code {
            0 => "Clear",
            1 | 2 => "Partly Cloudy",
            3 => "Cloudy",
            45 | 48 => "Fog",
            51..=57 => "Drizzle",
            61..=67 | 80..=82 => "Rain",
            71..=77 | 85 | 86 => "Snow",
            95..=99 => "Thunderstorm",
            _ => "Partly Cloudy",
        }
    }

    fn parse_reading(body: &serde_json::Value) -> AppResult<WeatherReading> {
        let current = &body["current"];
        let temperature_c = current["temperature_2m"].as_f64().ok_or_else(|| {
            AppError::WeatherUnavailable("payload is missing temperature".to_string())
        })?;
        let condition = current["weather_code"]
            .as_i64()
            .map(Self::describe_weather_code)
            .unwrap_or("Partly Cloudy");

        Ok(WeatherReading {
            temperature_c,
            condition: condition.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> AppResult<WeatherReading> {
        let url = format!("{}/v1/forecast", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m,weather_code".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AppError::TransientExternal(format!("Open-Meteo unreachable: {}", e))
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Open-Meteo request failed");
            return Err(if status.is_server_error() {
                AppError::TransientExternal(format!("Open-Meteo returned status {}", status))
            } else {
                AppError::ExternalApi(format!("Open-Meteo returned status {}: {}", status, body))
            });
        }

        let response_text = response.text().await?;
        let body: serde_json::Value = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(error = %e, response = %response_text, "Malformed Open-Meteo response");
            AppError::WeatherUnavailable(format!("Failed to parse weather response: {}", e))
        })?;

        let reading = Self::parse_reading(&body)?;

        tracing::debug!(
            latitude,
            longitude,
            temperature_c = reading.temperature_c,
            condition = %reading.condition,
            provider = "open-meteo",
            "Weather fetched"
        );

        Ok(reading)
    }

    fn name(&self) -> &'static str {
        "open-meteo"
    }
}
