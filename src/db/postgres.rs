use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::{
    db::stores::{CatalogStore, ExternalItemFilter, PreferenceRepository, SwipeHistoryStore},
    error::AppResult,
    models::{
        Category, ExternalItem, Item, ItemAttributes, OutfitSignature, OwnedItem,
        PreferenceRecord, Retailer, StylePreference, SwipeHistoryEntry, Verdict, WeatherRange,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the migrations under `migrations/`
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn tag_set(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, FromRow)]
struct WardrobeRow {
    id: String,
    name: String,
    category: String,
    color: String,
    material: Option<String>,
    brand: Option<String>,
    tags: Vec<String>,
    min_temp_c: Option<f64>,
    max_temp_c: Option<f64>,
    conditions: Vec<String>,
    image_url: Option<String>,
}

/// Converts rows to items, dropping any whose id cannot appear in an outfit signature
fn signable_items<R>(
    table: &str,
    rows: Vec<R>,
    id: impl Fn(&R) -> &str,
    into_item: impl Fn(R) -> Item,
) -> Vec<Item> {
    rows.into_iter()
        .filter(|row| {
            let usable = OutfitSignature::accepts_id(id(row));
            if !usable {
                tracing::warn!(table, id = id(row), "Skipping item with an unusable id");
            }
            usable
        })
        .map(into_item)
        .collect()
}

impl WardrobeRow {
    fn into_item(self) -> Item {
        let category =
            Category::parse(&self.category).unwrap_or_else(|| Category::infer_from_name(&self.name));
        let weather = match (self.min_temp_c, self.max_temp_c) {
            (Some(min_temp_c), Some(max_temp_c)) => Some(WeatherRange {
                min_temp_c,
                max_temp_c,
                conditions: self.conditions,
            }),
            _ => None,
        };

        Item::Owned(OwnedItem {
            attributes: ItemAttributes {
                id: self.id,
                name: self.name,
                category,
                color: self.color.trim().to_lowercase(),
                material: self.material,
                brand: self.brand,
                tags: tag_set(self.tags),
                weather,
            },
            image_url: self.image_url,
        })
    }
}

#[derive(Debug, FromRow)]
struct RetailerRow {
    id: String,
    retailer_id: String,
    retailer_name: String,
    name: String,
    category: Option<String>,
    color: String,
    material: Option<String>,
    brand: Option<String>,
    tags: Vec<String>,
    price: Option<f64>,
    product_url: Option<String>,
    image_url: Option<String>,
}

impl RetailerRow {
    fn into_item(self) -> Item {
        // Scraped rows often lack a category
        let category = self
            .category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or_else(|| Category::infer_from_name(&self.name));

        Item::External(ExternalItem {
            attributes: ItemAttributes {
                id: self.id,
                name: self.name,
                category,
                color: self.color.trim().to_lowercase(),
                material: self.material,
                brand: self.brand,
                tags: tag_set(self.tags),
                weather: None,
            },
            price: self.price,
            product_url: self.product_url,
            image_url: self.image_url,
            retailer: Some(Retailer {
                id: self.retailer_id,
                name: self.retailer_name,
            }),
        })
    }
}

#[derive(Debug, FromRow)]
struct SwipeRow {
    user_id: String,
    outfit_signature: String,
    verdict: String,
    style_preference: Option<String>,
    swiped_at: DateTime<Utc>,
}

impl SwipeRow {
    fn into_entry(self) -> Option<SwipeHistoryEntry> {
        let Some(verdict) = Verdict::parse(&self.verdict) else {
            tracing::warn!(verdict = %self.verdict, "Skipping swipe with unknown verdict");
            return None;
        };
        Some(SwipeHistoryEntry {
            user_id: self.user_id,
            outfit_signature: OutfitSignature::from(self.outfit_signature),
            verdict,
            style_preference: self.style_preference.as_deref().and_then(StylePreference::parse),
            timestamp: self.swiped_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PreferenceRow {
    user_id: String,
    item_id: String,
    category: String,
    color: String,
    brand: Option<String>,
    tags: Vec<String>,
    verdict: String,
    recorded_at: DateTime<Utc>,
}

impl PreferenceRow {
    fn into_record(self) -> Option<PreferenceRecord> {
        let (Some(category), Some(verdict)) =
            (Category::parse(&self.category), Verdict::parse(&self.verdict))
        else {
            tracing::warn!(item_id = %self.item_id, "Skipping malformed preference record");
            return None;
        };
        Some(PreferenceRecord {
            user_id: self.user_id,
            item_id: self.item_id,
            category,
            color: self.color,
            brand: self.brand,
            tags: tag_set(self.tags),
            verdict,
            timestamp: self.recorded_at,
        })
    }
}

/// Postgres-backed catalog, swipe history and preference storage
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgStore {
    async fn list_owned_items(&self, user_id: &str) -> AppResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, WardrobeRow>(
            r#"
            SELECT id, name, category, color, material, brand, tags,
                   min_temp_c, max_temp_c, conditions, image_url
            FROM wardrobe_items
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(signable_items(
            "wardrobe_items",
            rows,
            |row| &row.id,
            WardrobeRow::into_item,
        ))
    }

    async fn list_external_items(&self, filter: &ExternalItemFilter) -> AppResult<Vec<Item>> {
        // Category is resolved after inference, so the SQL limit only applies without one
        let sql_limit = match (filter.categories.is_empty(), filter.limit) {
            (true, Some(limit)) => Some(limit as i64),
            _ => None,
        };

        let rows = sqlx::query_as::<_, RetailerRow>(
            r#"
            SELECT id, retailer_id, retailer_name, name, category, color, material,
                   brand, tags, price, product_url, image_url
            FROM retailer_products
            WHERE in_stock
              AND ($1::DOUBLE PRECISION IS NULL OR price <= $1)
              AND ($2::TEXT IS NULL OR LOWER(brand) = LOWER($2))
            ORDER BY updated_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.max_price)
        .bind(filter.brand.as_deref())
        .bind(sql_limit)
        .fetch_all(&self.pool)
        .await?;

        let items = signable_items("retailer_products", rows, |row| &row.id, RetailerRow::into_item)
            .into_iter()
            .filter(|item| filter.matches(item))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(items)
    }
}

#[async_trait::async_trait]
impl SwipeHistoryStore for PgStore {
    async fn append(&self, entry: &SwipeHistoryEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO swipe_history (user_id, outfit_signature, verdict, style_preference, swiped_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.outfit_signature.as_str())
        .bind(entry.verdict.as_str())
        .bind(entry.style_preference.map(|s| s.to_string()))
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, user_id: &str, limit: usize) -> AppResult<Vec<SwipeHistoryEntry>> {
        let rows = sqlx::query_as::<_, SwipeRow>(
            r#"
            SELECT user_id, outfit_signature, verdict, style_preference, swiped_at
            FROM swipe_history
            WHERE user_id = $1
            ORDER BY swiped_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(SwipeRow::into_entry).collect())
    }
}

#[async_trait::async_trait]
impl PreferenceRepository for PgStore {
    async fn save(&self, user_id: &str, records: &[PreferenceRecord]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO preference_records
                    (user_id, item_id, category, color, brand, tags, verdict, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(user_id)
            .bind(&record.item_id)
            .bind(record.category.to_string())
            .bind(&record.color)
            .bind(record.brand.as_deref())
            .bind(record.tags.iter().cloned().collect::<Vec<String>>())
            .bind(record.verdict.as_str())
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(user_id, records = records.len(), "Saved preference records");
        Ok(())
    }

    async fn load(&self, user_id: &str) -> AppResult<Vec<PreferenceRecord>> {
        let rows = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT user_id, item_id, category, color, brand, tags, verdict, recorded_at
            FROM preference_records
            WHERE user_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(PreferenceRow::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn retailer_row(name: &str, category: Option<&str>) -> RetailerRow {
        RetailerRow {
            id: "p1".to_string(),
            retailer_id: "r1".to_string(),
            retailer_name: "Kiwi Threads".to_string(),
            name: name.to_string(),
            category: category.map(str::to_string),
            color: " Olive ".to_string(),
            material: None,
            brand: Some("Acme".to_string()),
            tags: vec!["Casual".to_string(), "".to_string()],
            price: Some(89.0),
            product_url: Some("https://example.com/p1".to_string()),
            image_url: None,
        }
    }

    #[test]
    fn test_retailer_row_infers_missing_category() {
        let item = retailer_row("Waxed Cotton Overshirt", None).into_item();
        assert_eq!(item.category(), Category::Outerwear);
        assert_eq!(item.source_type(), SourceType::External);
        assert_eq!(item.color(), "olive");
        assert_eq!(item.tags().len(), 1);
        assert!(item.has_tag("casual"));
    }

    #[test]
    fn test_retailer_row_keeps_explicit_category() {
        let item = retailer_row("Waxed Cotton Overshirt", Some("top")).into_item();
        assert_eq!(item.category(), Category::Top);
        if let Item::External(external) = item {
            assert_eq!(external.price, Some(89.0));
            assert_eq!(external.retailer.map(|r| r.name), Some("Kiwi Threads".to_string()));
        } else {
            panic!("expected an external item");
        }
    }

    #[test]
    fn test_wardrobe_row_builds_weather_range() {
        let row = WardrobeRow {
            id: "w1".to_string(),
            name: "Linen Shirt".to_string(),
            category: "top".to_string(),
            color: "white".to_string(),
            material: Some("linen".to_string()),
            brand: None,
            tags: vec!["summer".to_string()],
            min_temp_c: Some(20.0),
            max_temp_c: Some(32.0),
            conditions: vec!["sunny".to_string()],
            image_url: None,
        };
        let item = row.into_item();
        assert!(item.weather_range().is_some_and(|r| r.contains(25.0)));
        assert_eq!(item.material(), Some("linen"));
    }

    #[test]
    fn test_rows_with_unsignable_ids_are_skipped() {
        let rows = vec![
            retailer_row("Tee", None),
            RetailerRow {
                id: "p2,p3".to_string(),
                ..retailer_row("Tee", None)
            },
            RetailerRow {
                id: " ".to_string(),
                ..retailer_row("Tee", None)
            },
        ];

        let items = signable_items("retailer_products", rows, |row| &row.id, RetailerRow::into_item);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), "p1");
    }

    #[test]
    fn test_swipe_row_with_unknown_verdict_is_skipped() {
        let row = SwipeRow {
            user_id: "u1".to_string(),
            outfit_signature: "b1,t1".to_string(),
            verdict: "maybe".to_string(),
            style_preference: None,
            swiped_at: Utc::now(),
        };
        assert!(row.into_entry().is_none());
    }

    #[test]
    fn test_swipe_row_parses_style() {
        let row = SwipeRow {
            user_id: "u1".to_string(),
            outfit_signature: "t1,b1".to_string(),
            verdict: "like".to_string(),
            style_preference: Some("smart_casual".to_string()),
            swiped_at: Utc::now(),
        };
        let entry = row.into_entry().unwrap();
        assert_eq!(entry.outfit_signature.as_str(), "b1,t1");
        assert_eq!(entry.style_preference, Some(StylePreference::SmartCasual));
    }
}
