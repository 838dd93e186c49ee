use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Target style an outfit is scored against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreference {
    Professional,
    Formal,
    Casual,
    SmartCasual,
    Sporty,
    Evening,
}

impl StylePreference {
    /// Maps a free-text occasion to a style, defaulting to casual
    pub fn from_occasion(occasion: &str) -> Self {
        let lower = occasion.trim().to_lowercase();
        let contains = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if contains(&["professional", "work", "office", "business", "interview", "meeting"]) {
            StylePreference::Professional
        } else if contains(&["formal", "wedding", "gala", "black tie"]) {
            StylePreference::Formal
        } else if contains(&["smart", "brunch", "dinner"]) {
            StylePreference::SmartCasual
        } else if contains(&["gym", "sport", "run", "hike", "active"]) {
            StylePreference::Sporty
        } else if contains(&["evening", "party", "date", "night", "cocktail"]) {
            StylePreference::Evening
        } else {
            StylePreference::Casual
        }
    }

    /// Parses the snake_case name
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "professional" => Some(StylePreference::Professional),
            "formal" => Some(StylePreference::Formal),
            "casual" => Some(StylePreference::Casual),
            "smart_casual" => Some(StylePreference::SmartCasual),
            "sporty" => Some(StylePreference::Sporty),
            "evening" => Some(StylePreference::Evening),
            _ => None,
        }
    }

    /// Keywords an item's tags or name should mention to match this style
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            StylePreference::Professional => &[
                "professional", "formal", "business", "office", "tailored", "blazer",
                "oxford", "trouser", "chino", "loafer", "shirt",
            ],
            StylePreference::Formal => &[
                "formal", "suit", "tailored", "blazer", "dress", "silk", "oxford", "tie",
                "trouser",
            ],
            StylePreference::Casual => &[
                "casual", "relaxed", "tee", "t-shirt", "jean", "denim", "sneaker", "hoodie",
                "short", "sweat",
            ],
            StylePreference::SmartCasual => &[
                "smart", "casual", "chino", "polo", "knit", "loafer", "overshirt", "shirt",
            ],
            StylePreference::Sporty => &[
                "sport", "athletic", "active", "track", "jogger", "sneaker", "performance",
                "running",
            ],
            StylePreference::Evening => &[
                "evening", "party", "silk", "velvet", "satin", "black", "dress", "leather",
            ],
        }
    }
}

impl Display for StylePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StylePreference::Professional => "professional",
            StylePreference::Formal => "formal",
            StylePreference::Casual => "casual",
            StylePreference::SmartCasual => "smart_casual",
            StylePreference::Sporty => "sporty",
            StylePreference::Evening => "evening",
        };
        write!(f, "{}", name)
    }
}
