pub mod postgres;
pub mod redis;
pub mod stores;

pub use postgres::{create_pool, run_migrations, PgStore};
pub use redis::{create_redis_client, CacheWriterHandle, RedisCacheBackend};
pub use stores::{CatalogStore, ExternalItemFilter, PreferenceRepository, SwipeHistoryStore};

#[cfg(test)]
pub use stores::{MockCatalogStore, MockPreferenceRepository, MockSwipeHistoryStore};
