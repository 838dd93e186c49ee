//! Per-user incremental like/dislike statistics.
//!
//! Each user owns an aggregate of like/dislike tallies keyed by item, category,
//! color and brand, plus the records from the last seven days for recency
//! blending. Updates for one user serialize on that user's lock; different users
//! never contend beyond the brief map lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    db::PreferenceRepository,
    models::{Category, Item, PreferenceRecord, Verdict},
    services::persistence::{PersistJob, PersistenceQueue},
    services::scorer::PreferenceLookup,
};

const NEUTRAL_SCORE: f64 = 0.5;
const ALL_TIME_WEIGHT: f64 = 0.6;
const RECENT_WEIGHT: f64 = 0.4;
const RECENCY_WINDOW_DAYS: i64 = 7;

const ITEM_WEIGHT: f64 = 0.4;
const CATEGORY_WEIGHT: f64 = 0.3;
const COLOR_WEIGHT: f64 = 0.2;
const BRAND_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tally {
    likes: u32,
    dislikes: u32,
}

impl Tally {
    fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Like => self.likes = self.likes.saturating_add(1),
            Verdict::Dislike => self.dislikes = self.dislikes.saturating_add(1),
        }
    }

    fn like_ratio(&self) -> Option<f64> {
        let total = self.likes as f64 + self.dislikes as f64;
        if total == 0.0 {
            None
        } else {
            Some(self.likes as f64 / total)
        }
    }
}

/// Like/dislike tallies along the four scored dimensions
#[derive(Debug, Clone, Default)]
struct Tallies {
    items: HashMap<String, Tally>,
    categories: HashMap<Category, Tally>,
    colors: HashMap<String, Tally>,
    brands: HashMap<String, Tally>,
}

impl Tallies {
    fn add(&mut self, record: &PreferenceRecord) {
        self.items
            .entry(record.item_id.clone())
            .or_default()
            .add(record.verdict);
        self.categories
            .entry(record.category)
            .or_default()
            .add(record.verdict);
        self.colors
            .entry(record.color.to_lowercase())
            .or_default()
            .add(record.verdict);
        if let Some(brand) = &record.brand {
            self.brands
                .entry(brand.to_lowercase())
                .or_default()
                .add(record.verdict);
        }
    }

    fn from_records<'a, I: IntoIterator<Item = &'a PreferenceRecord>>(records: I) -> Self {
        let mut tallies = Self::default();
        for record in records {
            tallies.add(record);
        }
        tallies
    }

    fn total(&self) -> u64 {
        self.categories
            .values()
            .map(|t| t.likes as u64 + t.dislikes as u64)
            .sum()
    }
}

/// Weighted blend across item, category, color and brand, clamped to [0, 1]
fn score_against(all_time: &Tallies, recent: &Tallies, item: &Item) -> f64 {
    let dimension = |all: Option<&Tally>, recent: Option<&Tally>| {
        blend(
            all.and_then(Tally::like_ratio),
            recent.and_then(Tally::like_ratio),
        )
    };

    let item_id = item.id();
    let category = item.category();
    let color = item.color().to_lowercase();

    let item_score = dimension(all_time.items.get(item_id), recent.items.get(item_id));
    let category_score = dimension(
        all_time.categories.get(&category),
        recent.categories.get(&category),
    );
    let color_score = dimension(all_time.colors.get(&color), recent.colors.get(&color));
    let brand_score = match item.brand().map(str::to_lowercase) {
        Some(brand) => dimension(all_time.brands.get(&brand), recent.brands.get(&brand)),
        None => NEUTRAL_SCORE,
    };

    let score = ITEM_WEIGHT * item_score
        + CATEGORY_WEIGHT * category_score
        + COLOR_WEIGHT * color_score
        + BRAND_WEIGHT * brand_score;

    score.clamp(0.0, 1.0)
}

/// Rolling statistics for one user
#[derive(Debug, Clone, Default)]
pub struct PreferenceAggregate {
    all_time: Tallies,
    recent: VecDeque<PreferenceRecord>,
    loaded: bool,
    /// Records folded before the stored history was loaded
    unsynced: Vec<PreferenceRecord>,
}

impl PreferenceAggregate {
    fn fold(&mut self, record: &PreferenceRecord, now: DateTime<Utc>) {
        self.all_time.add(record);

        let cutoff = recency_cutoff(now);
        if record.timestamp >= cutoff {
            self.recent.push_back(record.clone());
        }
        self.recent.retain(|r| r.timestamp >= cutoff);
    }

    fn recent_tallies(&self, now: DateTime<Utc>) -> Tallies {
        let cutoff = recency_cutoff(now);
        Tallies::from_records(self.recent.iter().filter(|r| r.timestamp >= cutoff))
    }

    /// Total folded records across all time
    pub fn interactions(&self) -> u64 {
        self.all_time.total()
    }

    /// Blended score for an item at `now`, always within [0, 1]
    pub fn score_item_at(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        score_against(&self.all_time, &self.recent_tallies(now), item)
    }
}

/// Stored timestamps keep microsecond precision
fn same_interaction(a: &PreferenceRecord, b: &PreferenceRecord) -> bool {
    a.item_id == b.item_id
        && a.verdict == b.verdict
        && a.timestamp.timestamp_micros() == b.timestamp.timestamp_micros()
}

fn recency_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::days(RECENCY_WINDOW_DAYS)
}

/// 0.6 all-time + 0.4 recent; recent falls back to all-time, no history is neutral
fn blend(all_time: Option<f64>, recent: Option<f64>) -> f64 {
    match (all_time, recent) {
        (None, _) => NEUTRAL_SCORE,
        (Some(all), None) => all,
        (Some(all), Some(recent)) => ALL_TIME_WEIGHT * all + RECENT_WEIGHT * recent,
    }
}

/// Request-scoped copy of one user's statistics, safe to score against without locks
#[derive(Debug, Clone, Default)]
pub struct PreferenceProfile {
    all_time: Tallies,
    recent: Tallies,
}

impl PreferenceProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn interactions(&self) -> u64 {
        self.all_time.total()
    }
}

impl PreferenceLookup for PreferenceProfile {
    fn score_item(&self, item: &Item) -> f64 {
        score_against(&self.all_time, &self.recent, item)
    }
}

type UserSlot = Arc<Mutex<PreferenceAggregate>>;

/// Owner of all per-user preference state
pub struct PreferenceStore {
    users: RwLock<HashMap<String, UserSlot>>,
    repository: Option<Arc<dyn PreferenceRepository>>,
    writer: Option<PersistenceQueue>,
    load_timeout: Duration,
}

impl PreferenceStore {
    /// Store with no backing repository; state lives only in memory
    pub fn in_memory() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            repository: None,
            writer: None,
            load_timeout: Duration::from_secs(3),
        }
    }

    pub fn new(
        repository: Arc<dyn PreferenceRepository>,
        writer: PersistenceQueue,
        load_timeout: Duration,
    ) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            repository: Some(repository),
            writer: Some(writer),
            load_timeout,
        }
    }

    fn slot(&self, user_id: &str) -> UserSlot {
        if let Some(slot) = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
        {
            return slot.clone();
        }

        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn is_loaded(&self, user_id: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .is_some_and(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).loaded)
    }

    /// Seeds a user's aggregate from stored records the first time they are seen.
    /// A slow or failing repository counts as an empty history.
    pub async fn ensure_loaded(&self, user_id: &str) {
        if self.is_loaded(user_id) {
            return;
        }

        let stored = match &self.repository {
            Some(repository) => {
                match tokio::time::timeout(self.load_timeout, repository.load(user_id)).await {
                    Ok(Ok(records)) => records,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, user_id, "Failed to load stored preferences");
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::warn!(user_id, "Timed out loading stored preferences");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let slot = self.slot(user_id);
        let mut aggregate = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if aggregate.loaded {
            return;
        }
        let now = Utc::now();
        let mut unsynced = std::mem::take(&mut aggregate.unsynced);
        let mut folded = 0;
        for record in &stored {
            if let Some(pos) = unsynced.iter().position(|r| same_interaction(r, record)) {
                unsynced.swap_remove(pos);
                continue;
            }
            aggregate.fold(record, now);
            folded += 1;
        }
        aggregate.loaded = true;
        tracing::debug!(user_id, records = folded, "Preferences warmed up");
    }

    /// Folds one record per item into the user's aggregate, then hands the records
    /// to the write-behind queue
    pub fn record_interaction<'a, I>(
        &self,
        user_id: &str,
        items: I,
        verdict: Verdict,
        timestamp: DateTime<Utc>,
    ) -> Vec<PreferenceRecord>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let records: Vec<PreferenceRecord> = items
            .into_iter()
            .map(|item| PreferenceRecord::from_item(user_id, item, verdict, timestamp))
            .collect();

        {
            let slot = self.slot(user_id);
            let mut aggregate = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Utc::now().max(timestamp);
            for record in &records {
                aggregate.fold(record, now);
            }
            if !aggregate.loaded && self.repository.is_some() {
                aggregate.unsynced.extend(records.iter().cloned());
            }
        }

        if let Some(writer) = &self.writer {
            writer.enqueue(PersistJob::Preferences {
                user_id: user_id.to_string(),
                records: records.clone(),
            });
        }

        records
    }

    pub fn score_item(&self, user_id: &str, item: &Item) -> f64 {
        self.score_item_at(user_id, item, Utc::now())
    }

    pub fn score_item_at(&self, user_id: &str, item: &Item, now: DateTime<Utc>) -> f64 {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        match users.get(user_id) {
            Some(slot) => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .score_item_at(item, now),
            None => NEUTRAL_SCORE,
        }
    }

    /// Immutable copy of a user's aggregate for one generation request
    pub fn snapshot(&self, user_id: &str) -> PreferenceProfile {
        let now = Utc::now();
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        match users.get(user_id) {
            Some(slot) => {
                let aggregate = slot.lock().unwrap_or_else(PoisonError::into_inner);
                PreferenceProfile {
                    all_time: aggregate.all_time.clone(),
                    recent: aggregate.recent_tallies(now),
                }
            }
            None => PreferenceProfile::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockPreferenceRepository;
    use crate::error::AppError;
    use chrono::SubsecRound;

    fn red_top(id: &str) -> Item {
        Item::owned(id, "Red Knit", Category::Top, "red")
    }

    #[test]
    fn test_unknown_user_is_neutral() {
        let store = PreferenceStore::in_memory();
        assert_eq!(store.score_item("nobody", &red_top("r1")), 0.5);
    }

    #[test]
    fn test_five_red_dislikes_push_sixth_red_below_neutral() {
        let store = PreferenceStore::in_memory();
        let now = Utc::now();
        for i in 0..5 {
            let item = red_top(&format!("red-{}", i));
            store.record_interaction("u1", [&item], Verdict::Dislike, now);
        }

        let score = store.score_item("u1", &red_top("red-6"));
        assert!(score < 0.5, "score was {}", score);
    }

    #[test]
    fn test_likes_raise_score_for_same_item() {
        let store = PreferenceStore::in_memory();
        let item = Item::owned("i1", "Navy Chino", Category::Bottom, "navy").with_brand("Acme");
        store.record_interaction("u1", [&item], Verdict::Like, Utc::now());
        assert!((store.score_item("u1", &item) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_stays_in_unit_interval_at_any_volume() {
        let store = PreferenceStore::in_memory();
        let item = red_top("r1");
        let now = Utc::now();

        for round in 0..2_000 {
            let verdict = if round % 3 == 0 { Verdict::Like } else { Verdict::Dislike };
            store.record_interaction("u1", [&item], verdict, now);
            if round % 250 == 0 {
                let score = store.score_item("u1", &item);
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn test_recent_activity_outweighs_stale_history() {
        let now = Utc::now();
        let stale = now - chrono::Duration::days(30);
        let item = red_top("r1");

        let mut aggregate = PreferenceAggregate::default();
        for _ in 0..4 {
            aggregate.fold(
                &PreferenceRecord::from_item("u1", &item, Verdict::Dislike, stale),
                now,
            );
        }
        let before = aggregate.score_item_at(&item, now);

        aggregate.fold(
            &PreferenceRecord::from_item("u1", &item, Verdict::Like, now),
            now,
        );
        let after = aggregate.score_item_at(&item, now);

        // All-time ratio 0.2 blended with a recent ratio of 1.0
        let expected_dimension = 0.6 * 0.2 + 0.4 * 1.0;
        let expected = 0.4 * expected_dimension + 0.3 * expected_dimension + 0.2 * expected_dimension + 0.1 * 0.5;
        assert!((after - expected).abs() < 1e-9);
        assert!(after > before);
        assert_eq!(aggregate.recent.len(), 1);
    }

    #[test]
    fn test_blend_rules() {
        assert_eq!(blend(None, None), 0.5);
        assert_eq!(blend(Some(0.25), None), 0.25);
        assert!((blend(Some(0.0), Some(1.0)) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_updates() {
        let store = PreferenceStore::in_memory();
        let item = red_top("r1");
        let profile = store.snapshot("u1");

        store.record_interaction("u1", [&item], Verdict::Dislike, Utc::now());

        assert_eq!(profile.score_item(&item), 0.5);
        assert_eq!(profile.interactions(), 0);
        assert!(store.snapshot("u1").score_item(&item) < 0.5);
    }

    #[tokio::test]
    async fn test_concurrent_swipes_for_one_user_are_not_lost() {
        let store = Arc::new(PreferenceStore::in_memory());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let item = Item::owned(&format!("i{}", i), "Tee", Category::Top, "white");
                store.record_interaction("u1", [&item], Verdict::Like, Utc::now());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.snapshot("u1").interactions(), 32);
    }

    #[tokio::test]
    async fn test_warm_up_loads_stored_records_once() {
        let item = red_top("r1");
        let stored = vec![PreferenceRecord::from_item("u1", &item, Verdict::Dislike, Utc::now())];

        let mut repository = MockPreferenceRepository::new();
        repository
            .expect_load()
            .times(1)
            .returning(move |_| Ok(stored.clone()));

        let (writer, _handle) = PersistenceQueue::spawn(
            Arc::new(crate::db::MockSwipeHistoryStore::new()),
            Arc::new(MockPreferenceRepository::new()),
            crate::services::persistence::QueueSettings {
                capacity: 8,
                flush_delay: Duration::from_millis(10),
                max_retries: 0,
            },
        );
        let store = PreferenceStore::new(Arc::new(repository), writer, Duration::from_secs(1));

        store.ensure_loaded("u1").await;
        store.ensure_loaded("u1").await;

        assert_eq!(store.snapshot("u1").interactions(), 1);
        assert!(store.score_item("u1", &item) < 0.5);
    }

    #[tokio::test]
    async fn test_swipe_before_warm_up_is_counted_once() {
        let item = red_top("r1");
        let other = red_top("r2");
        let swiped_at = Utc::now();
        let older = swiped_at - chrono::Duration::hours(1);

        let mut repository = MockPreferenceRepository::new();
        repository.expect_load().times(1).returning(move |_| {
            let persisted = swiped_at.trunc_subsecs(6);
            Ok(vec![
                PreferenceRecord::from_item("u1", &red_top("r1"), Verdict::Dislike, persisted),
                PreferenceRecord::from_item("u1", &red_top("r2"), Verdict::Like, older),
            ])
        });

        let mut sink = MockPreferenceRepository::new();
        sink.expect_save().returning(|_, _| Ok(()));
        let (writer, _handle) = PersistenceQueue::spawn(
            Arc::new(crate::db::MockSwipeHistoryStore::new()),
            Arc::new(sink),
            crate::services::persistence::QueueSettings {
                capacity: 8,
                flush_delay: Duration::from_millis(10),
                max_retries: 0,
            },
        );
        let store = PreferenceStore::new(Arc::new(repository), writer, Duration::from_secs(1));

        store.record_interaction("u1", [&item], Verdict::Dislike, swiped_at);
        store.ensure_loaded("u1").await;

        assert_eq!(store.snapshot("u1").interactions(), 2);
        assert!(store.score_item("u1", &other) > store.score_item("u1", &item));
    }

    #[tokio::test]
    async fn test_swipe_not_yet_stored_survives_warm_up() {
        let item = red_top("r1");
        let mut repository = MockPreferenceRepository::new();
        repository.expect_load().returning(|_| Ok(vec![]));

        let mut sink = MockPreferenceRepository::new();
        sink.expect_save().returning(|_, _| Ok(()));
        let (writer, _handle) = PersistenceQueue::spawn(
            Arc::new(crate::db::MockSwipeHistoryStore::new()),
            Arc::new(sink),
            crate::services::persistence::QueueSettings {
                capacity: 8,
                flush_delay: Duration::from_millis(10),
                max_retries: 0,
            },
        );
        let store = PreferenceStore::new(Arc::new(repository), writer, Duration::from_secs(1));

        store.record_interaction("u1", [&item], Verdict::Dislike, Utc::now());
        store.ensure_loaded("u1").await;

        assert_eq!(store.snapshot("u1").interactions(), 1);
        assert!(store.score_item("u1", &item) < 0.5);
    }

    #[tokio::test]
    async fn test_failed_warm_up_leaves_user_neutral() {
        let mut repository = MockPreferenceRepository::new();
        repository
            .expect_load()
            .returning(|_| Err(AppError::TransientExternal("db down".to_string())));

        let (writer, _handle) = PersistenceQueue::spawn(
            Arc::new(crate::db::MockSwipeHistoryStore::new()),
            Arc::new(MockPreferenceRepository::new()),
            crate::services::persistence::QueueSettings {
                capacity: 8,
                flush_delay: Duration::from_millis(10),
                max_retries: 0,
            },
        );
        let store = PreferenceStore::new(Arc::new(repository), writer, Duration::from_secs(1));

        store.ensure_loaded("u1").await;
        assert_eq!(store.score_item("u1", &red_top("r1")), 0.5);
    }
}
