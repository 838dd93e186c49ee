//! TTL memoization for generation results, plus latency and hit-rate tracking.
//!
//! Values are stored as JSON behind a [`CacheBackend`] so the same cache can sit on
//! an in-process map or on Redis. A backend failure is treated as a miss.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

const LATENCY_WINDOW: usize = 100;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the stored value unless it is missing or expired
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process backend; expired entries are never returned and are pruned on write
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| now < entry.expires_at);
        // Last writer wins
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

/// Snapshot of cache effectiveness
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub average_latency_ms: f64,
    pub total_requests: u64,
    pub latency_target_met: bool,
}

pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    latency_target: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    requests: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, latency_target: Duration) -> Self {
        Self {
            backend,
            ttl,
            latency_target,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    /// Cached value for `key` if still fresh, otherwise the generator's result, stored
    pub async fn get_or_generate<T, F, Fut>(&self, key: &str, generator: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.lookup(key).await {
            return value;
        }

        let value = generator().await;
        self.store(key, &value).await;
        value
    }

    /// Checks every key up front, generates only the misses concurrently and stores
    /// each result independently. Output order follows `keys`.
    pub async fn get_or_generate_batch<T, F, Fut>(&self, keys: &[String], generator: F) -> Vec<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut results: Vec<Option<T>> = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        for (index, key) in keys.iter().enumerate() {
            let cached = self.lookup(key).await;
            if cached.is_none() {
                missing.push(index);
            }
            results.push(cached);
        }

        let generated =
            futures::future::join_all(missing.iter().map(|&index| generator(keys[index].clone())))
                .await;

        let stores = missing
            .iter()
            .zip(&generated)
            .map(|(&index, value)| self.store(&keys[index], value));
        futures::future::join_all(stores).await;

        for (index, value) in missing.into_iter().zip(generated) {
            results[index] = Some(value);
        }

        results.into_iter().flatten().collect()
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, key, "Cache read failed, treating as miss");
                None
            }
        };

        let value = raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, key, "Discarding undecodable cache entry");
                None
            }
        });

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Result cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Result cache miss");
        }
        value
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)));

        let outcome = match result {
            Ok(json) => self.backend.put(key, json, self.ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, key, "Cache write failed");
        }
    }

    /// Adds one end-to-end response latency to the rolling window
    pub fn record_latency(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut latencies = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(elapsed);
    }

    /// Mean of the last 100 recorded latencies, 0 when none were recorded
    pub fn average_latency_ms(&self) -> f64 {
        let latencies = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        if latencies.is_empty() {
            return 0.0;
        }
        let total: f64 = latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        total / latencies.len() as f64
    }

    pub fn is_latency_target_met(&self) -> bool {
        self.average_latency_ms() <= self.latency_target.as_secs_f64() * 1000.0
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        match hits + misses {
            0 => 0.0,
            total => hits as f64 / total as f64,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            average_latency_ms: self.average_latency_ms(),
            total_requests: self.requests.load(Ordering::Relaxed),
            latency_target_met: self.is_latency_target_met(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl_secs: u64) -> ResultCache {
        ResultCache::new(
            Arc::new(MemoryCacheBackend::new()),
            Duration::from_secs(ttl_secs),
            Duration::from_millis(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_runs_once_within_ttl_and_again_after() {
        let cache = cache(300);
        let calls = AtomicUsize::new(0);
        let generate = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            vec!["outfit".to_string()]
        };

        let first: Vec<String> = cache.get_or_generate("k", generate).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        let second: Vec<String> = cache.get_or_generate("k", generate).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let _: Vec<String> = cache.get_or_generate("k", generate).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_backend_never_returns_expired() {
        let backend = MemoryCacheBackend::new();
        tokio_test::assert_ok!(backend.put("k", "v".to_string(), Duration::from_secs(10)).await);
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_generates_only_misses() {
        let cache = cache(300);
        let _: u32 = cache.get_or_generate("a", || async { 1 }).await;

        let calls = AtomicUsize::new(0);
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values: Vec<u32> = cache
            .get_or_generate_batch(&keys, |key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match key.as_str() {
                        "b" => 2,
                        _ => 3,
                    }
                }
            })
            .await;

        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let again: Vec<u32> = cache
            .get_or_generate_batch(&keys, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { 0 }
            })
            .await;
        assert_eq!(again, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_counts_as_miss() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(AppError::TransientExternal("redis down".to_string())));
        backend
            .expect_put()
            .returning(|_, _, _| Err(AppError::TransientExternal("redis down".to_string())));

        let cache = ResultCache::new(
            Arc::new(backend),
            Duration::from_secs(300),
            Duration::from_millis(300),
        );
        let value: u32 = cache.get_or_generate("k", || async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn test_rolling_latency_keeps_last_hundred() {
        let cache = cache(300);
        for _ in 0..100 {
            cache.record_latency(Duration::from_millis(1000));
        }
        assert!(!cache.is_latency_target_met());

        for _ in 0..100 {
            cache.record_latency(Duration::from_millis(100));
        }
        assert!((cache.average_latency_ms() - 100.0).abs() < 1e-6);
        assert!(cache.is_latency_target_met());
        assert_eq!(cache.stats().total_requests, 200);
    }

    #[test]
    fn test_empty_stats() {
        let cache = cache(300);
        assert_eq!(cache.hit_rate(), 0.0);
        assert_eq!(cache.average_latency_ms(), 0.0);
        assert!(cache.is_latency_target_met());
    }
}
