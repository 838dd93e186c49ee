/// Weather data provider abstraction
///
/// The Weather Gateway talks to weather sources only through this trait so the
/// concrete HTTP client can be swapped or mocked. Providers report raw failures;
/// caching, retries, circuit breaking and fallback are the gateway's job.
use crate::error::AppResult;

pub mod open_meteo;

pub use open_meteo::OpenMeteoProvider;

/// Current conditions as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temperature_c: f64,
    pub condition: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Fetch current weather at the given coordinates
    ///
    /// Fails with `WeatherUnavailable` when the payload lacks a temperature.
    async fn current_weather(&self, latitude: f64, longitude: f64) -> AppResult<WeatherReading>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
