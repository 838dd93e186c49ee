use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::item::{Category, Item};
use super::outfit::OutfitSignature;
use super::style::StylePreference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Like,
    Dislike,
}

impl Verdict {
    pub fn is_like(&self) -> bool {
        matches!(self, Verdict::Like)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Like => "like",
            Verdict::Dislike => "dislike",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "like" => Some(Verdict::Like),
            "dislike" => Some(Verdict::Dislike),
            _ => None,
        }
    }
}

/// One item-level judgement, created once per swipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: String,
    pub item_id: String,
    pub category: Category,
    pub color: String,
    pub brand: Option<String>,
    pub tags: BTreeSet<String>,
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
}

impl PreferenceRecord {
    pub fn from_item(user_id: &str, item: &Item, verdict: Verdict, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: item.id().to_string(),
            category: item.category(),
            color: item.color().to_string(),
            brand: item.brand().map(str::to_string),
            tags: item.tags().clone(),
            verdict,
            timestamp,
        }
    }
}

/// Outfit-level swipe, read back to seed de-duplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeHistoryEntry {
    pub user_id: String,
    pub outfit_signature: OutfitSignature,
    pub verdict: Verdict,
    #[serde(default)]
    pub style_preference: Option<StylePreference>,
    pub timestamp: DateTime<Utc>,
}
