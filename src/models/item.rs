use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display};

/// Garment slot an item can fill in an outfit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Top,
    Bottom,
    Outerwear,
    Shoes,
    Accessory,
}

/// Name keywords per category, checked in order: outerwear, shoes, tops, bottoms,
/// then accessories. The first category with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Outerwear, &["jacket", "coat", "blazer", "overshirt", "parka", "gilet"]),
    (Category::Shoes, &["shoe", "sneaker", "boot", "loafer", "slide", "sandal"]),
    (
        Category::Top,
        &[
            "shirt", "t-shirt", "tee", "polo", "knit", "sweatshirt", "sweater", "jumper",
            "crewneck", "henley", "singlet", "tank", "top",
        ],
    ),
    (
        Category::Bottom,
        &["pant", "jean", "short", "trouser", "chino", "track", "jogger", "skirt"],
    ),
    (
        Category::Accessory,
        &["belt", "bag", "wallet", "tie", "sock", "scarf", "hat", "cap"],
    ),
];

impl Category {
    /// Whether every outfit must fill this slot
    pub fn is_required(&self) -> bool {
        matches!(self, Category::Top | Category::Bottom)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "top" | "tops" => Some(Category::Top),
            "bottom" | "bottoms" => Some(Category::Bottom),
            "outerwear" => Some(Category::Outerwear),
            "shoes" | "shoe" | "footwear" => Some(Category::Shoes),
            "accessory" | "accessories" => Some(Category::Accessory),
            _ => None,
        }
    }

    /// Infers a category from a free-text product name, defaulting to `Top`
    pub fn infer_from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Top)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Top => "top",
            Category::Bottom => "bottom",
            Category::Outerwear => "outerwear",
            Category::Shoes => "shoes",
            Category::Accessory => "accessory",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Owned,
    External,
}

/// Temperature band and conditions an item is suited to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRange {
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl WeatherRange {
    pub fn contains(&self, temperature_c: f64) -> bool {
        temperature_c >= self.min_temp_c && temperature_c <= self.max_temp_c
    }
}

/// Attributes every item carries regardless of where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub color: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub weather: Option<WeatherRange>,
}

/// A garment from the user's own wardrobe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedItem {
    #[serde(flatten)]
    pub attributes: ItemAttributes,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retailer {
    pub id: String,
    pub name: String,
}

/// A garment sourced from a retailer catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalItem {
    #[serde(flatten)]
    pub attributes: ItemAttributes,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub retailer: Option<Retailer>,
}

/// Immutable item snapshot, fetched per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "lowercase")]
pub enum Item {
    Owned(OwnedItem),
    External(ExternalItem),
}

impl Item {
    /// Creates an owned item with the given core attributes
    pub fn owned(id: &str, name: &str, category: Category, color: &str) -> Self {
        Item::Owned(OwnedItem {
            attributes: ItemAttributes::new(id, name, category, color),
            image_url: None,
        })
    }

    /// Creates an externally sourced item with the given core attributes
    pub fn external(id: &str, name: &str, category: Category, color: &str) -> Self {
        Item::External(ExternalItem {
            attributes: ItemAttributes::new(id, name, category, color),
            price: None,
            product_url: None,
            image_url: None,
            retailer: None,
        })
    }

    pub fn attributes(&self) -> &ItemAttributes {
        match self {
            Item::Owned(item) => &item.attributes,
            Item::External(item) => &item.attributes,
        }
    }

    fn attributes_mut(&mut self) -> &mut ItemAttributes {
        match self {
            Item::Owned(item) => &mut item.attributes,
            Item::External(item) => &mut item.attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.attributes().id
    }

    pub fn name(&self) -> &str {
        &self.attributes().name
    }

    pub fn category(&self) -> Category {
        self.attributes().category
    }

    pub fn color(&self) -> &str {
        &self.attributes().color
    }

    pub fn material(&self) -> Option<&str> {
        self.attributes().material.as_deref()
    }

    pub fn brand(&self) -> Option<&str> {
        self.attributes().brand.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.attributes().tags
    }

    pub fn weather_range(&self) -> Option<&WeatherRange> {
        self.attributes().weather.as_ref()
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Item::Owned(_) => SourceType::Owned,
            Item::External(_) => SourceType::External,
        }
    }

    pub fn is_external(&self) -> bool {
        self.source_type() == SourceType::External
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().contains(&tag.to_lowercase())
    }

    /// True when any tag, or the name, mentions one of the keywords
    pub fn mentions_any(&self, keywords: &[&str]) -> bool {
        let name = self.name().to_lowercase();
        keywords
            .iter()
            .any(|kw| self.tags().contains(*kw) || name.contains(kw))
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes_mut()
            .tags
            .extend(tags.into_iter().map(|t| t.as_ref().trim().to_lowercase()));
        self
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        self.attributes_mut().brand = Some(brand.to_string());
        self
    }

    pub fn with_material(mut self, material: &str) -> Self {
        self.attributes_mut().material = Some(material.to_string());
        self
    }

    pub fn with_weather_range(mut self, range: WeatherRange) -> Self {
        self.attributes_mut().weather = Some(range);
        self
    }
}

impl ItemAttributes {
    fn new(id: &str, name: &str, category: Category, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            color: color.trim().to_lowercase(),
            material: None,
            brand: None,
            tags: BTreeSet::new(),
            weather: None,
        }
    }
}
