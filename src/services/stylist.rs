//! Request pipeline behind the public outfit surface.
//!
//! A generation request fans out to weather, catalog, swipe history and the
//! preference warm-up concurrently, each branch bounded by its own timeout and
//! replaced by an empty default when it fails. The joined inputs feed the
//! combiner through the result cache. The whole request runs under an overall
//! deadline; missing it yields the basics set flagged as degraded.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    config::Config,
    db::{CatalogStore, ExternalItemFilter, SwipeHistoryStore},
    error::{AppError, AppResult},
    models::{
        CategoryPools, Item, OutfitCombination, OutfitSignature, StylePreference,
        SwipeHistoryEntry, Verdict, WeatherBands, WeatherLabel, WeatherSnapshot,
    },
    services::{
        circuit_breaker::BreakerState,
        combiner::{fallback_outfits, GenerationOutcome, OutfitCombiner},
        persistence::{PersistJob, PersistenceQueue},
        preferences::{PreferenceProfile, PreferenceStore},
        result_cache::ResultCache,
        weather::WeatherGateway,
    },
};

const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct StylistSettings {
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub branch_timeout: Duration,
    pub request_deadline: Duration,
    pub history_limit: usize,
    pub external_item_limit: usize,
    pub max_retries: u32,
    pub weather_bands: WeatherBands,
}

impl StylistSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_latitude: config.default_latitude,
            default_longitude: config.default_longitude,
            branch_timeout: config.branch_timeout(),
            request_deadline: config.request_deadline(),
            history_limit: config.history_limit,
            external_item_limit: config.external_item_limit,
            max_retries: config.max_retries,
            weather_bands: WeatherBands {
                cold_c: config.cold_threshold_c,
                hot_c: config.hot_threshold_c,
                layering_c: config.layering_threshold_c,
            },
        }
    }
}

impl Default for StylistSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub outfits: Vec<OutfitCombination>,
    pub degraded: bool,
    pub weather: WeatherSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub cache_hit_rate: f64,
    pub average_response_time_ms: f64,
    pub total_requests: u64,
    pub latency_target_met: bool,
    pub persistence_failures: u64,
    pub persistence_dropped: u64,
    pub breaker_state: BreakerState,
}

/// Everything one generation needs, gathered by the fan-out
struct RequestInputs {
    weather: WeatherSnapshot,
    pools: CategoryPools,
    shown: HashSet<OutfitSignature>,
    profile: PreferenceProfile,
}

impl RequestInputs {
    /// Stable digest of every input the generated batch depends on
    fn fingerprint(
        &self,
        style: StylePreference,
        count: usize,
        user_id: Option<&str>,
        bands: &WeatherBands,
    ) -> u64 {
        let mut hasher = DefaultHasher::new();
        style.to_string().hash(&mut hasher);
        self.weather.bucket(bands).hash(&mut hasher);
        count.hash(&mut hasher);
        user_id.hash(&mut hasher);
        for item in self.pools.all() {
            item.id().hash(&mut hasher);
        }
        let shown: BTreeSet<&OutfitSignature> = self.shown.iter().collect();
        shown.hash(&mut hasher);
        self.profile.interactions().hash(&mut hasher);
        hasher.finish()
    }
}

pub struct StylistService {
    catalog: Arc<dyn CatalogStore>,
    history: Arc<dyn SwipeHistoryStore>,
    weather: Arc<WeatherGateway>,
    preferences: Arc<PreferenceStore>,
    combiner: Arc<OutfitCombiner>,
    cache: Arc<ResultCache>,
    persistence: Option<PersistenceQueue>,
    /// Swipes recorded by this process, newest last, per user
    recent_swipes: RwLock<HashMap<String, VecDeque<OutfitSignature>>>,
    settings: StylistSettings,
}

impl StylistService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        history: Arc<dyn SwipeHistoryStore>,
        weather: Arc<WeatherGateway>,
        preferences: Arc<PreferenceStore>,
        combiner: Arc<OutfitCombiner>,
        cache: Arc<ResultCache>,
        settings: StylistSettings,
    ) -> Self {
        Self {
            catalog,
            history,
            weather,
            preferences,
            combiner,
            cache,
            persistence: None,
            recent_swipes: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Routes swipe history writes through the write-behind queue
    pub fn with_persistence(mut self, queue: PersistenceQueue) -> Self {
        self.persistence = Some(queue);
        self
    }

    /// Ranked outfits for an occasion. Always returns at least one outfit.
    #[instrument(skip(self))]
    pub async fn generate_outfits(
        &self,
        occasion: &str,
        weather_label: Option<&str>,
        count: usize,
        user_id: Option<&str>,
    ) -> GenerationResponse {
        let started = Instant::now();
        let style = StylePreference::from_occasion(occasion);
        let label = WeatherLabel::parse(weather_label);
        let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());

        let pipeline = self.run_pipeline(style, label, count, user_id);
        let response = match tokio::time::timeout(self.settings.request_deadline, pipeline).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.settings.request_deadline.as_millis() as u64,
                    "Generation deadline exceeded, returning basics"
                );
                let weather = label.snapshot().unwrap_or_else(WeatherSnapshot::fallback);
                let outfits = fallback_outfits(self.combiner.scorer(), &weather, style);
                GenerationResponse {
                    outfits: outfits.iter().map(OutfitCombination::from).collect(),
                    degraded: true,
                    weather,
                }
            }
        };

        let elapsed = started.elapsed();
        self.cache.record_latency(elapsed);
        tracing::info!(
            style = %style,
            outfits = response.outfits.len(),
            degraded = response.degraded,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generated outfits"
        );
        response
    }

    async fn run_pipeline(
        &self,
        style: StylePreference,
        label: WeatherLabel,
        count: usize,
        user_id: Option<&str>,
    ) -> GenerationResponse {
        let inputs = self.gather_inputs(label, user_id).await;
        let fingerprint = inputs.fingerprint(style, count, user_id, &self.settings.weather_bands);
        let key = format!("{:016x}", fingerprint);

        let outcome: GenerationOutcome = self
            .cache
            .get_or_generate(&key, || async {
                let mut rng = StdRng::seed_from_u64(fingerprint);
                self.combiner.generate(
                    &inputs.pools,
                    &inputs.weather,
                    style,
                    &inputs.shown,
                    count,
                    &inputs.profile,
                    &mut rng,
                )
            })
            .await;

        GenerationResponse {
            outfits: outcome.outfits.iter().map(OutfitCombination::from).collect(),
            degraded: outcome.degraded,
            weather: inputs.weather,
        }
    }

    async fn gather_inputs(&self, label: WeatherLabel, user_id: Option<&str>) -> RequestInputs {
        let weather = async {
            match label.snapshot() {
                Some(snapshot) => snapshot,
                None => {
                    let live = self.weather.get_weather(
                        self.settings.default_latitude,
                        self.settings.default_longitude,
                        false,
                    );
                    tokio::time::timeout(self.settings.branch_timeout, live)
                        .await
                        .unwrap_or_else(|_| {
                            tracing::warn!("Weather branch timed out, using fallback");
                            WeatherSnapshot::fallback()
                        })
                }
            }
        };

        let owned = async {
            match user_id {
                Some(user_id) => self
                    .fetch_branch("owned_items", || self.catalog.list_owned_items(user_id))
                    .await
                    .unwrap_or_default(),
                None => Vec::new(),
            }
        };

        let filter = ExternalItemFilter::with_limit(self.settings.external_item_limit);
        let external = self
            .fetch_branch("external_items", || self.catalog.list_external_items(&filter));

        let history = async {
            match user_id {
                Some(user_id) => self
                    .fetch_branch("swipe_history", || {
                        self.history.query(user_id, self.settings.history_limit)
                    })
                    .await
                    .unwrap_or_default(),
                None => Vec::new(),
            }
        };

        let warm_up = async {
            if let Some(user_id) = user_id {
                self.preferences.ensure_loaded(user_id).await;
            }
        };

        let (weather, owned, external, history, ()) =
            tokio::join!(weather, owned, external, history, warm_up);

        let pools = CategoryPools::from_items(owned.into_iter().chain(external.unwrap_or_default()));
        let mut shown: HashSet<OutfitSignature> =
            history.into_iter().map(|entry| entry.outfit_signature).collect();
        let profile = match user_id {
            Some(user_id) => {
                shown.extend(self.recent_signatures(user_id));
                self.preferences.snapshot(user_id)
            }
            None => PreferenceProfile::empty(),
        };

        tracing::debug!(
            items = pools.len(),
            shown = shown.len(),
            interactions = profile.interactions(),
            "Request inputs gathered"
        );

        RequestInputs {
            weather,
            pools,
            shown,
            profile,
        }
    }

    /// Runs one collaborator call under the branch timeout, retrying transient
    /// failures. `None` means the caller should use its default.
    async fn fetch_branch<T, F, Fut>(&self, branch: &'static str, call: F) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = async {
            for attempt in 0..=self.settings.max_retries {
                if attempt > 0 {
                    let delay_ms = RETRY_BASE_DELAY_MS * 2_u64.pow(attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }

                match call().await {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        let retryable = e.is_transient() && attempt < self.settings.max_retries;
                        tracing::warn!(error = %e, branch, attempt, retryable, "Branch call failed");
                        if !retryable {
                            return None;
                        }
                    }
                }
            }
            None
        };

        match tokio::time::timeout(self.settings.branch_timeout, attempts).await {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(branch, "Branch timed out, using default");
                None
            }
        }
    }

    fn recent_signatures(&self, user_id: &str) -> Vec<OutfitSignature> {
        self.recent_swipes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records a like or dislike on a shown outfit.
    ///
    /// Preferences update before this returns; storage writes happen in the
    /// background and never fail the call.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub fn record_swipe(
        &self,
        user_id: &str,
        items: &[Item],
        verdict: Verdict,
        style_preference: Option<StylePreference>,
    ) -> AppResult<OutfitSignature> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
        }
        if items.is_empty() {
            return Err(AppError::InvalidInput("outfit has no items".to_string()));
        }
        if let Some(item) = items.iter().find(|i| !OutfitSignature::accepts_id(i.id())) {
            return Err(AppError::InvalidInput(format!(
                "item id {:?} must be non-empty and must not contain ','",
                item.id()
            )));
        }

        let timestamp = Utc::now();
        let signature = OutfitSignature::from_ids(items.iter().map(Item::id));
        self.preferences
            .record_interaction(user_id, items, verdict, timestamp);

        if let Some(queue) = &self.persistence {
            queue.enqueue(PersistJob::Swipe(SwipeHistoryEntry {
                user_id: user_id.to_string(),
                outfit_signature: signature.clone(),
                verdict,
                style_preference,
                timestamp,
            }));
        }

        {
            let mut recent = self
                .recent_swipes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let entries = recent.entry(user_id.to_string()).or_default();
            if entries.len() >= self.settings.history_limit.max(1) {
                entries.pop_front();
            }
            entries.push_back(signature.clone());
        }

        tracing::info!(user_id, signature = %signature, verdict = verdict.as_str(), "Swipe recorded");
        Ok(signature)
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let stats = self.cache.stats();
        let (persistence_failures, persistence_dropped) = self
            .persistence
            .as_ref()
            .map(|queue| (queue.failures(), queue.dropped()))
            .unwrap_or((0, 0));

        PerformanceMetrics {
            cache_hit_rate: stats.hit_rate,
            average_response_time_ms: stats.average_latency_ms,
            total_requests: stats.total_requests,
            latency_target_met: stats.latency_target_met,
            persistence_failures,
            persistence_dropped,
            breaker_state: self.weather.breaker_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockCatalogStore, MockSwipeHistoryStore};
    use crate::models::Category;
    use crate::services::circuit_breaker::{BreakerConfig, CircuitBreaker};
    use crate::services::providers::{MockWeatherProvider, WeatherProvider, WeatherReading};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::services::result_cache::MemoryCacheBackend;
    use crate::services::scorer::Scorer;

    fn wardrobe() -> Vec<Item> {
        vec![
            Item::owned("t1", "White Oxford Shirt", Category::Top, "white")
                .with_tags(["professional", "long-sleeve"]),
            Item::owned("b1", "Navy Trousers", Category::Bottom, "navy")
                .with_tags(["professional", "tailored"]),
            Item::owned("b2", "Grey Chinos", Category::Bottom, "grey")
                .with_tags(["professional"]),
        ]
    }

    fn catalog_with(owned: Vec<Item>) -> MockCatalogStore {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_list_owned_items()
            .returning(move |_| Ok(owned.clone()));
        catalog.expect_list_external_items().returning(|_| Ok(vec![]));
        catalog
    }

    fn empty_history() -> MockSwipeHistoryStore {
        let mut history = MockSwipeHistoryStore::new();
        history.expect_query().returning(|_, _| Ok(vec![]));
        history
    }

    fn gateway(provider: impl WeatherProvider + 'static) -> Arc<WeatherGateway> {
        Arc::new(WeatherGateway::new(
            Arc::new(provider),
            CircuitBreaker::new("weather", BreakerConfig::default()),
            Duration::from_secs(300),
            0,
        ))
    }

    fn service_with(
        catalog: impl CatalogStore + 'static,
        history: impl SwipeHistoryStore + 'static,
        provider: impl WeatherProvider + 'static,
        settings: StylistSettings,
    ) -> StylistService {
        StylistService::new(
            Arc::new(catalog),
            Arc::new(history),
            gateway(provider),
            Arc::new(PreferenceStore::in_memory()),
            Arc::new(OutfitCombiner::new(Scorer::default(), Default::default())),
            Arc::new(ResultCache::new(
                Arc::new(MemoryCacheBackend::new()),
                Duration::from_secs(300),
                Duration::from_millis(300),
            )),
            settings,
        )
    }

    fn service(catalog: MockCatalogStore) -> StylistService {
        let mut provider = MockWeatherProvider::new();
        provider.expect_current_weather().never();
        service_with(catalog, empty_history(), provider, StylistSettings::default())
    }

    #[tokio::test]
    async fn test_label_weather_skips_provider() {
        let service = service(catalog_with(wardrobe()));
        let response = service
            .generate_outfits("office", Some("cold"), 2, Some("u1"))
            .await;

        assert_eq!(response.weather.temperature_c, 5.0);
        assert!(!response.degraded);
        assert!(!response.outfits.is_empty());
        assert!(response.outfits.iter().all(|o| o.items.len() >= 2));
    }

    #[tokio::test]
    async fn test_current_weather_goes_through_gateway() {
        let mut provider = MockWeatherProvider::new();
        provider.expect_current_weather().times(1).returning(|_, _| {
            Ok(WeatherReading {
                temperature_c: 26.0,
                condition: "Sunny".to_string(),
            })
        });
        provider.expect_name().return_const("mock");

        let service = service_with(
            catalog_with(wardrobe()),
            empty_history(),
            provider,
            StylistSettings::default(),
        );
        let response = service.generate_outfits("brunch", None, 2, Some("u1")).await;
        assert_eq!(response.weather.temperature_c, 26.0);
    }

    /// Never answers; counts how often it was asked
    struct HungProvider(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl WeatherProvider for HungProvider {
        async fn current_weather(&self, _latitude: f64, _longitude: f64) -> AppResult<WeatherReading> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hung"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_weather_provider_opens_breaker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service_with(
            catalog_with(wardrobe()),
            empty_history(),
            HungProvider(calls.clone()),
            StylistSettings::default(),
        );

        for _ in 0..8 {
            let response = service.generate_outfits("casual", None, 2, None).await;
            assert!(response.weather.is_fallback());
        }

        assert_eq!(service.weather.breaker_state(), BreakerState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failed_catalog_degrades_to_basics() {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_list_owned_items()
            .returning(|_| Err(AppError::InvalidInput("bad user".to_string())));
        catalog
            .expect_list_external_items()
            .returning(|_| Err(AppError::ExternalApi("catalog down".to_string())));

        let response = service(catalog)
            .generate_outfits("casual", Some("mild"), 5, Some("u1"))
            .await;

        assert!(response.degraded);
        assert_eq!(response.outfits.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_catalog_failure_is_retried() {
        let mut catalog = MockCatalogStore::new();
        let mut seq = mockall::Sequence::new();
        catalog
            .expect_list_owned_items()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::TransientExternal("pool busy".to_string())));
        let owned = wardrobe();
        catalog
            .expect_list_owned_items()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(owned.clone()));
        catalog.expect_list_external_items().returning(|_| Ok(vec![]));

        let response = service(catalog)
            .generate_outfits("office", Some("mild"), 2, Some("u1"))
            .await;
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let service = service(catalog_with(wardrobe()));
        let first = service
            .generate_outfits("office", Some("cool"), 2, Some("u1"))
            .await;
        let second = service
            .generate_outfits("office", Some("cool"), 2, Some("u1"))
            .await;

        let ids = |response: &GenerationResponse| -> Vec<OutfitSignature> {
            response.outfits.iter().map(|o| o.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        let metrics = service.get_performance_metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_swiped_outfit_is_not_shown_again() {
        let items = vec![
            Item::owned("t1", "White Tee", Category::Top, "white").with_tags(["casual"]),
            Item::owned("b1", "Blue Jeans", Category::Bottom, "blue").with_tags(["casual"]),
            Item::owned("b2", "Black Jeans", Category::Bottom, "black").with_tags(["casual"]),
        ];
        let service = service(catalog_with(items.clone()));

        service
            .record_swipe("u1", &items[..2], Verdict::Like, Some(StylePreference::Casual))
            .unwrap();

        let response = service
            .generate_outfits("casual", Some("warm"), 5, Some("u1"))
            .await;
        assert!(!response.degraded);
        for outfit in &response.outfits {
            let ids: Vec<&str> = outfit.items.iter().map(Item::id).collect();
            assert!(!(ids.contains(&"t1") && ids.contains(&"b1")));
        }
    }

    #[test]
    fn test_record_swipe_rejects_malformed_input() {
        let service = service(catalog_with(vec![]));
        let items = wardrobe();

        assert!(matches!(
            service.record_swipe("  ", &items, Verdict::Like, None),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            service.record_swipe("u1", &[], Verdict::Like, None),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_record_swipe_rejects_ids_that_would_split_the_signature() {
        let service = service(catalog_with(vec![]));
        let items = vec![
            Item::owned("a,b", "Oxford Shirt", Category::Top, "white"),
            Item::owned("c", "Navy Trousers", Category::Bottom, "navy"),
        ];

        assert!(matches!(
            service.record_swipe("u1", &items, Verdict::Dislike, None),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(service.preferences.snapshot("u1").interactions(), 0);
    }

    #[test]
    fn test_record_swipe_updates_preferences() {
        let service = service(catalog_with(vec![]));
        let items = wardrobe();
        let signature = service
            .record_swipe("u1", &items[..2], Verdict::Dislike, None)
            .unwrap();

        assert_eq!(signature.as_str(), "b1,t1");
        assert!(service.preferences.score_item("u1", &items[0]) < 0.5);
    }

    struct SlowCatalog;

    #[async_trait::async_trait]
    impl CatalogStore for SlowCatalog {
        async fn list_owned_items(&self, _user_id: &str) -> AppResult<Vec<Item>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }

        async fn list_external_items(&self, _filter: &ExternalItemFilter) -> AppResult<Vec<Item>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_basics() {
        let settings = StylistSettings {
            request_deadline: Duration::from_secs(1),
            branch_timeout: Duration::from_secs(30),
            ..StylistSettings::default()
        };
        let mut provider = MockWeatherProvider::new();
        provider.expect_current_weather().never();
        let service = service_with(SlowCatalog, empty_history(), provider, settings);

        let response = service
            .generate_outfits("office", Some("hot"), 3, Some("u1"))
            .await;
        assert!(response.degraded);
        assert_eq!(response.outfits.len(), 2);
        assert_eq!(response.weather.temperature_c, 30.0);
    }

    #[tokio::test]
    async fn test_metrics_serialize_camel_case() {
        let service = service(catalog_with(wardrobe()));
        service.generate_outfits("office", Some("mild"), 1, None).await;

        let json = serde_json::to_value(service.get_performance_metrics()).unwrap();
        assert_eq!(json["totalRequests"], 1);
        assert_eq!(json["breakerState"], "closed");
        assert!(json.get("cacheHitRate").is_some());
        assert!(json.get("averageResponseTimeMs").is_some());
        assert_eq!(json["persistenceDropped"], 0);
    }
}
