use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::item::{Category, Item};

/// Deterministic identity of an outfit: its item ids, sorted and joined.
/// Two outfits holding the same items always share a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutfitSignature(String);

impl OutfitSignature {
    const SEPARATOR: &'static str = ",";

    /// Whether an item id can take part in a signature without splitting it
    pub fn accepts_id(id: &str) -> bool {
        !id.trim().is_empty() && !id.contains(Self::SEPARATOR)
    }

    pub fn from_ids<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids: Vec<&str> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids.join(Self::SEPARATOR))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.split(Self::SEPARATOR).filter(|id| !id.is_empty())
    }
}

impl Display for OutfitSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OutfitSignature {
    fn from(raw: String) -> Self {
        Self::from_ids(raw.split(Self::SEPARATOR).filter(|id| !id.is_empty()))
    }
}

/// One item per slot. Top and bottom are required, the rest are optional layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitCandidate {
    pub top: Item,
    pub bottom: Item,
    #[serde(default)]
    pub outerwear: Option<Item>,
    #[serde(default)]
    pub shoes: Option<Item>,
    #[serde(default)]
    pub accessory: Option<Item>,
}

impl OutfitCandidate {
    pub fn new(top: Item, bottom: Item) -> Self {
        Self {
            top,
            bottom,
            outerwear: None,
            shoes: None,
            accessory: None,
        }
    }

    pub fn with_outerwear(mut self, outerwear: Item) -> Self {
        self.outerwear = Some(outerwear);
        self
    }

    pub fn with_shoes(mut self, shoes: Item) -> Self {
        self.shoes = Some(shoes);
        self
    }

    pub fn with_accessory(mut self, accessory: Item) -> Self {
        self.accessory = Some(accessory);
        self
    }

    /// Items in slot order: top, bottom, outerwear, shoes, accessory
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        [
            Some(&self.top),
            Some(&self.bottom),
            self.outerwear.as_ref(),
            self.shoes.as_ref(),
            self.accessory.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn has_outerwear(&self) -> bool {
        self.outerwear.is_some()
    }

    pub fn contains_external(&self) -> bool {
        self.items().any(Item::is_external)
    }

    pub fn signature(&self) -> OutfitSignature {
        OutfitSignature::from_ids(self.items().map(Item::id))
    }

    /// Signature over top, bottom and outerwear. Shoes and accessories do not
    /// make an otherwise shown outfit new.
    pub fn core_signature(&self) -> OutfitSignature {
        let core = [Some(&self.top), Some(&self.bottom), self.outerwear.as_ref()];
        OutfitSignature::from_ids(core.into_iter().flatten().map(Item::id))
    }

    /// Whether two outfits share a top, bottom or outerwear piece
    pub fn shares_core_piece(&self, other: &OutfitCandidate) -> bool {
        let same_layer = match (&self.outerwear, &other.outerwear) {
            (Some(a), Some(b)) => a.id() == b.id(),
            _ => false,
        };
        self.top.id() == other.top.id() || self.bottom.id() == other.bottom.id() || same_layer
    }

    /// Rebuilds a candidate from a flat item list, keeping the first item per slot.
    /// Returns `None` unless both a top and a bottom are present.
    pub fn from_items(items: Vec<Item>) -> Option<Self> {
        let mut top = None;
        let mut bottom = None;
        let mut outerwear = None;
        let mut shoes = None;
        let mut accessory = None;

        for item in items {
            let slot = match item.category() {
                Category::Top => &mut top,
                Category::Bottom => &mut bottom,
                Category::Outerwear => &mut outerwear,
                Category::Shoes => &mut shoes,
                Category::Accessory => &mut accessory,
            };
            if slot.is_none() {
                *slot = Some(item);
            }
        }

        Some(Self {
            top: top?,
            bottom: bottom?,
            outerwear,
            shoes,
            accessory,
        })
    }
}

/// Per-factor contributions to a composite score, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub color_harmony: f64,
    pub style_preference_match: f64,
    pub weather_appropriateness: f64,
    pub style_consistency: f64,
    pub preference_adjustment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOutfit {
    pub outfit: OutfitCandidate,
    pub signature: OutfitSignature,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasoning: String,
}

/// Outfit as returned to UI and chat callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitCombination {
    pub id: OutfitSignature,
    pub items: Vec<Item>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasoning: String,
}

impl From<&ScoredOutfit> for OutfitCombination {
    fn from(scored: &ScoredOutfit) -> Self {
        Self {
            id: scored.signature.clone(),
            items: scored.outfit.items().cloned().collect(),
            score: scored.score,
            breakdown: scored.breakdown,
            reasoning: scored.reasoning.clone(),
        }
    }
}

impl From<ScoredOutfit> for OutfitCombination {
    fn from(scored: ScoredOutfit) -> Self {
        Self::from(&scored)
    }
}
