/// Collaborator contracts consumed by the outfit pipeline
///
/// Catalog, swipe history and preference storage live outside the engine. The
/// pipeline talks to them only through these traits so Postgres can be swapped
/// for in-memory fakes in tests.
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{Category, Item, PreferenceRecord, SwipeHistoryEntry},
};

/// Narrows an external catalog listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalItemFilter {
    /// Empty means every category
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ExternalItemFilter {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Whether an external item passes the filter
    pub fn matches(&self, item: &Item) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&item.category()) {
            return false;
        }
        if let Some(brand) = &self.brand {
            if !item.brand().is_some_and(|b| b.eq_ignore_ascii_case(brand)) {
                return false;
            }
        }
        if let (Some(max_price), Item::External(external)) = (self.max_price, item) {
            if external.price.is_some_and(|price| price > max_price) {
                return false;
            }
        }
        true
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_owned_items(&self, user_id: &str) -> AppResult<Vec<Item>>;

    async fn list_external_items(&self, filter: &ExternalItemFilter) -> AppResult<Vec<Item>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SwipeHistoryStore: Send + Sync {
    async fn append(&self, entry: &SwipeHistoryEntry) -> AppResult<()>;

    /// Most recent entries first
    async fn query(&self, user_id: &str, limit: usize) -> AppResult<Vec<SwipeHistoryEntry>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn save(&self, user_id: &str, records: &[PreferenceRecord]) -> AppResult<()>;

    async fn load(&self, user_id: &str) -> AppResult<Vec<PreferenceRecord>>;
}
