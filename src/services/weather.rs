use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    models::{WeatherSnapshot, WeatherSource},
    services::circuit_breaker::{BreakerError, BreakerState, CircuitBreaker},
    services::providers::WeatherProvider,
};

const RETRY_BASE_DELAY_MS: u64 = 100;

/// Coordinates rounded to two decimals (~1km) so nearby lookups share a cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LocationKey(i64, i64);

impl LocationKey {
    fn new(latitude: f64, longitude: f64) -> Self {
        Self(
            (latitude * 100.0).round() as i64,
            (longitude * 100.0).round() as i64,
        )
    }
}

struct CachedWeather {
    snapshot: WeatherSnapshot,
    stored_at: Instant,
}

/// Current weather behind a TTL cache and a circuit breaker.
///
/// Never fails: any unrecoverable problem yields the neutral fallback snapshot.
pub struct WeatherGateway {
    provider: Arc<dyn WeatherProvider>,
    breaker: CircuitBreaker,
    cache: RwLock<HashMap<LocationKey, CachedWeather>>,
    ttl: Duration,
    max_retries: u32,
}

impl WeatherGateway {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        breaker: CircuitBreaker,
        ttl: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            breaker,
            cache: RwLock::new(HashMap::new()),
            ttl,
            max_retries,
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Returns cached weather inside its TTL, otherwise fetches through the breaker
    #[instrument(skip(self))]
    pub async fn get_weather(
        &self,
        latitude: f64,
        longitude: f64,
        force_refresh: bool,
    ) -> WeatherSnapshot {
        let key = LocationKey::new(latitude, longitude);

        if !force_refresh {
            if let Some(snapshot) = self.cached(key).await {
                tracing::debug!("Weather cache hit");
                return snapshot;
            }
        }

        match self.fetch(latitude, longitude).await {
            Some(snapshot) => {
                self.cache.write().await.insert(
                    key,
                    CachedWeather {
                        snapshot: snapshot.clone(),
                        stored_at: Instant::now(),
                    },
                );
                snapshot
            }
            None => WeatherSnapshot::fallback(),
        }
    }

    async fn cached(&self, key: LocationKey) -> Option<WeatherSnapshot> {
        let cache = self.cache.read().await;
        cache
            .get(&key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.snapshot.clone())
    }

    /// Retries transient failures; gives up at once when the circuit is open
    async fn fetch(&self, latitude: f64, longitude: f64) -> Option<WeatherSnapshot> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = RETRY_BASE_DELAY_MS * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let result = self
                .breaker
                .call(|| self.provider.current_weather(latitude, longitude))
                .await;

            match result {
                Ok(reading) => {
                    return Some(WeatherSnapshot::new(
                        reading.temperature_c,
                        &reading.condition,
                        self.ttl.as_secs(),
                        WeatherSource::Live,
                    ));
                }
                Err(BreakerError::Open(name)) => {
                    tracing::debug!(breaker = name, "Weather circuit open, using fallback");
                    return None;
                }
                Err(BreakerError::Failed(e)) => {
                    let retryable = e.is_transient() && attempt < self.max_retries;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retryable,
                        provider = self.provider.name(),
                        "Weather unavailable"
                    );
                    if !retryable {
                        return None;
                    }
                }
            }
        }

        None
    }
}
