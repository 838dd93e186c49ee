pub mod item;
pub mod outfit;
pub mod preference;
pub mod style;
pub mod weather;

pub use item::{Category, ExternalItem, Item, ItemAttributes, OwnedItem, Retailer, SourceType, WeatherRange};
pub use outfit::{
    OutfitCandidate, OutfitCombination, OutfitSignature, ScoreBreakdown, ScoredOutfit,
};
pub use preference::{PreferenceRecord, SwipeHistoryEntry, Verdict};
pub use style::StylePreference;
pub use weather::{WeatherBands, WeatherLabel, WeatherSnapshot, WeatherSource};

/// Items available to one generation request, split by slot
#[derive(Debug, Clone, Default)]
pub struct CategoryPools {
    pub tops: Vec<Item>,
    pub bottoms: Vec<Item>,
    pub outerwear: Vec<Item>,
    pub shoes: Vec<Item>,
    pub accessories: Vec<Item>,
}

impl CategoryPools {
    /// Sorts items into pools by category, dropping duplicate ids
    pub fn from_items<I: IntoIterator<Item = Item>>(items: I) -> Self {
        let mut pools = Self::default();
        let mut seen = std::collections::HashSet::new();

        for item in items {
            if !seen.insert(item.id().to_string()) {
                continue;
            }
            match item.category() {
                Category::Top => pools.tops.push(item),
                Category::Bottom => pools.bottoms.push(item),
                Category::Outerwear => pools.outerwear.push(item),
                Category::Shoes => pools.shoes.push(item),
                Category::Accessory => pools.accessories.push(item),
            }
        }

        pools
    }

    pub fn all(&self) -> impl Iterator<Item = &Item> {
        self.tops
            .iter()
            .chain(&self.bottoms)
            .chain(&self.outerwear)
            .chain(&self.shoes)
            .chain(&self.accessories)
    }

    pub fn has_required(&self) -> bool {
        !self.tops.is_empty() && !self.bottoms.is_empty()
    }

    pub fn has_external(&self) -> bool {
        self.all().any(Item::is_external)
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
