pub mod circuit_breaker;
pub mod combiner;
pub mod persistence;
pub mod preferences;
pub mod providers;
pub mod result_cache;
pub mod scorer;
pub mod stylist;
pub mod weather;

pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use combiner::{fallback_outfits, CombinerConfig, GenerationOutcome, OutfitCombiner};
pub use persistence::{PersistJob, PersistenceQueue, PersistenceWorkerHandle, QueueSettings};
pub use preferences::{PreferenceProfile, PreferenceStore};
pub use result_cache::{CacheBackend, MemoryCacheBackend, ResultCache};
pub use scorer::{Scorer, ScoringWeights, WeatherThresholds};
pub use stylist::{GenerationResponse, PerformanceMetrics, StylistService, StylistSettings};
pub use weather::WeatherGateway;
