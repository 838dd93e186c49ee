//! Composite outfit scoring.
//!
//! Five factors, each in [0, 1], are combined with configurable weights that must
//! sum to 1.0: color harmony, style preference match, weather appropriateness,
//! style consistency and the learned preference adjustment.

use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    models::{Category, Item, OutfitCandidate, ScoreBreakdown, ScoredOutfit, StylePreference, WeatherSnapshot},
};

const WEIGHT_TOLERANCE: f64 = 1e-6;

const NEUTRAL_COLORS: &[&str] = &[
    "black", "white", "grey", "gray", "charcoal", "navy", "beige", "cream", "ivory", "tan",
    "khaki", "camel", "brown", "taupe", "stone", "denim", "nude", "silver",
];

/// Positions on the painter's (RYB) color wheel, where red faces green.
/// More specific names come first so that "sky blue" resolves to sky.
const COLOR_HUES: &[(&str, f64)] = &[
    ("burgundy", 350.0),
    ("maroon", 350.0),
    ("crimson", 355.0),
    ("coral", 20.0),
    ("rust", 30.0),
    ("orange", 60.0),
    ("mustard", 100.0),
    ("gold", 100.0),
    ("yellow", 120.0),
    ("olive", 150.0),
    ("lime", 160.0),
    ("sage", 170.0),
    ("emerald", 185.0),
    ("mint", 190.0),
    ("green", 180.0),
    ("turquoise", 205.0),
    ("teal", 210.0),
    ("cyan", 215.0),
    ("sky", 230.0),
    ("cobalt", 240.0),
    ("blue", 240.0),
    ("lavender", 285.0),
    ("violet", 300.0),
    ("purple", 300.0),
    ("magenta", 320.0),
    ("pink", 340.0),
    ("red", 0.0),
];

const LONG_SLEEVE: &[&str] = &[
    "long-sleeve", "long sleeve", "long_sleeve", "sweater", "jumper", "knit", "hoodie",
    "sweat", "cardigan", "turtleneck", "flannel",
];
const SHORT_SLEEVE: &[&str] = &[
    "short-sleeve", "short sleeve", "short_sleeve", "tee", "t-shirt", "tank", "singlet", "polo",
];
const SHORTS: &[&str] = &["shorts", "short"];
const OPEN_SHOES: &[&str] = &["sandal", "slide", "thong", "flip-flop"];
const BOOTS: &[&str] = &["boot"];
const WARM_ACCESSORIES: &[&str] = &["scarf", "beanie", "gloves", "wool"];
const SUN_ACCESSORIES: &[&str] = &["sunglasses", "cap", "hat"];
const WATERPROOF: &[&str] = &["waterproof", "rain", "shell", "gore-tex"];

/// Weights for scoring components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub color_harmony: f64,
    pub style_preference_match: f64,
    pub weather_appropriateness: f64,
    pub style_consistency: f64,
    pub preference_adjustment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            color_harmony: 0.25,
            style_preference_match: 0.20,
            weather_appropriateness: 0.25,
            style_consistency: 0.15,
            preference_adjustment: 0.15,
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> [f64; 5] {
        [
            self.color_harmony,
            self.style_preference_match,
            self.weather_appropriateness,
            self.style_consistency,
            self.preference_adjustment,
        ]
    }

    pub fn validate(&self) -> AppResult<()> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::InvalidConfiguration(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AppError::InvalidConfiguration(format!(
                "scoring weights sum to {:.4}, expected 1.0",
                total
            )));
        }
        Ok(())
    }
}

/// Temperature boundaries for the weather rule table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherThresholds {
    /// Below this is cold
    pub cold_c: f64,
    /// Above this is hot
    pub hot_c: f64,
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            cold_c: 15.0,
            hot_c: 20.0,
        }
    }
}

/// Learned per-item preference signal in [0, 1], 0.5 meaning no opinion
pub trait PreferenceLookup {
    fn score_item(&self, item: &Item) -> f64;
}

/// Lookup for anonymous requests
pub struct NeutralPreferences;

impl PreferenceLookup for NeutralPreferences {
    fn score_item(&self, _item: &Item) -> f64 {
        0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Climate {
    Cold,
    Mild,
    Hot,
}

/// Score calculator for outfit candidates
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    thresholds: WeatherThresholds,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), WeatherThresholds::default())
    }
}

impl Scorer {
    pub fn new(weights: ScoringWeights, thresholds: WeatherThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Composite score and per-factor breakdown. Pure: same inputs, same output.
    pub fn score(
        &self,
        outfit: &OutfitCandidate,
        weather: &WeatherSnapshot,
        style: StylePreference,
        preferences: &dyn PreferenceLookup,
    ) -> (f64, ScoreBreakdown) {
        let items: Vec<&Item> = outfit.items().collect();

        let breakdown = ScoreBreakdown {
            color_harmony: color_harmony(&items),
            style_preference_match: style_preference_match(&items, style),
            weather_appropriateness: self.weather_appropriateness(outfit, weather),
            style_consistency: style_consistency(&items),
            preference_adjustment: preference_adjustment(&items, preferences),
        };

        let composite = breakdown.color_harmony * self.weights.color_harmony
            + breakdown.style_preference_match * self.weights.style_preference_match
            + breakdown.weather_appropriateness * self.weights.weather_appropriateness
            + breakdown.style_consistency * self.weights.style_consistency
            + breakdown.preference_adjustment * self.weights.preference_adjustment;

        (composite.clamp(0.0, 1.0), breakdown)
    }

    /// Scores a candidate and attaches its signature and a short explanation
    pub fn score_outfit(
        &self,
        outfit: OutfitCandidate,
        weather: &WeatherSnapshot,
        style: StylePreference,
        preferences: &dyn PreferenceLookup,
    ) -> ScoredOutfit {
        let (score, breakdown) = self.score(&outfit, weather, style, preferences);
        let reasoning = explain(&outfit, &breakdown, weather, style);
        ScoredOutfit {
            signature: outfit.signature(),
            outfit,
            score,
            breakdown,
            reasoning,
        }
    }

    fn climate(&self, temperature_c: f64) -> Climate {
        if temperature_c < self.thresholds.cold_c {
            Climate::Cold
        } else if temperature_c > self.thresholds.hot_c {
            Climate::Hot
        } else {
            Climate::Mild
        }
    }

    /// Mean per-item score from the temperature/category rule table
    fn weather_appropriateness(&self, outfit: &OutfitCandidate, weather: &WeatherSnapshot) -> f64 {
        let climate = self.climate(weather.temperature_c);
        let layered = outfit.has_outerwear();
        let wet = weather.is_wet();

        let scores: Vec<f64> = outfit
            .items()
            .map(|item| {
                let mut score = item_weather_score(item, climate, layered);

                if let Some(range) = item.weather_range() {
                    if range.contains(weather.temperature_c) {
                        score += 0.1;
                    } else {
                        score *= 0.6;
                    }
                }

                if wet {
                    match item.category() {
                        Category::Outerwear if item.mentions_any(WATERPROOF) => score += 0.2,
                        Category::Shoes if item.mentions_any(OPEN_SHOES) => score -= 0.2,
                        _ => {}
                    }
                }

                score.clamp(0.0, 1.0)
            })
            .collect();

        mean(&scores).unwrap_or(0.5)
    }
}

fn item_weather_score(item: &Item, climate: Climate, layered: bool) -> f64 {
    match (climate, item.category()) {
        (Climate::Cold, Category::Outerwear) => 1.0,
        (Climate::Cold, Category::Top) => {
            if item.mentions_any(LONG_SLEEVE) {
                0.9
            } else if item.mentions_any(SHORT_SLEEVE) {
                if layered {
                    0.4
                } else {
                    0.1
                }
            } else {
                0.6
            }
        }
        (Climate::Cold, Category::Bottom) => {
            if item.mentions_any(SHORTS) {
                0.1
            } else {
                0.8
            }
        }
        (Climate::Cold, Category::Shoes) => {
            if item.mentions_any(BOOTS) {
                1.0
            } else if item.mentions_any(OPEN_SHOES) {
                0.2
            } else {
                0.7
            }
        }
        (Climate::Cold, Category::Accessory) => {
            if item.mentions_any(WARM_ACCESSORIES) {
                1.0
            } else {
                0.6
            }
        }

        (Climate::Hot, Category::Outerwear) => 0.1,
        (Climate::Hot, Category::Top) => {
            if item.mentions_any(SHORT_SLEEVE) {
                0.9
            } else if item.mentions_any(LONG_SLEEVE) {
                0.3
            } else {
                0.6
            }
        }
        (Climate::Hot, Category::Bottom) => {
            if item.mentions_any(SHORTS) {
                1.0
            } else {
                0.6
            }
        }
        (Climate::Hot, Category::Shoes) => {
            if item.mentions_any(OPEN_SHOES) {
                0.9
            } else if item.mentions_any(BOOTS) {
                0.3
            } else {
                0.7
            }
        }
        (Climate::Hot, Category::Accessory) => {
            if item.mentions_any(SUN_ACCESSORIES) {
                0.9
            } else if item.mentions_any(WARM_ACCESSORIES) {
                0.2
            } else {
                0.7
            }
        }

        (Climate::Mild, Category::Outerwear) => 0.7,
        (Climate::Mild, Category::Bottom) => {
            if item.mentions_any(SHORTS) {
                0.6
            } else {
                0.8
            }
        }
        (Climate::Mild, Category::Accessory) => 0.7,
        (Climate::Mild, _) => 0.8,
    }
}

fn is_neutral(color: &str) -> bool {
    NEUTRAL_COLORS.iter().any(|n| color.contains(n))
}

fn hue_of(color: &str) -> Option<f64> {
    COLOR_HUES
        .iter()
        .find(|(name, _)| color.contains(name))
        .map(|(_, hue)| *hue)
}

fn hue_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

/// Neutral-dominant 0.9, monochromatic 0.8, any complementary pair 0.8, any
/// analogous pair (within 30 degrees) 0.7, more than three distinct colors 0.3,
/// otherwise 0.5
fn color_harmony(items: &[&Item]) -> f64 {
    let n = items.len();
    if n == 0 {
        return 0.5;
    }

    let neutral_count = items.iter().filter(|i| is_neutral(i.color())).count();
    if neutral_count + 1 >= n {
        return 0.9;
    }

    let mut distinct: Vec<&str> = items
        .iter()
        .map(|i| i.color())
        .filter(|c| !is_neutral(c))
        .collect();
    distinct.sort_unstable();
    distinct.dedup();

    let hues: Vec<Option<f64>> = distinct.iter().map(|c| hue_of(c)).collect();

    let monochromatic = distinct.len() == 1
        || (hues.iter().all(Option::is_some)
            && hues.windows(2).all(|w| w[0] == w[1]));
    if monochromatic {
        return 0.8;
    }

    let known: Vec<f64> = hues.iter().flatten().copied().collect();
    let pair_distances: Vec<f64> = known
        .iter()
        .enumerate()
        .flat_map(|(i, a)| known[i + 1..].iter().map(move |b| hue_distance(*a, *b)))
        .collect();

    if pair_distances.iter().any(|d| (d - 180.0).abs() <= 30.0) {
        0.8
    } else if pair_distances.iter().any(|d| *d <= 30.0) {
        0.7
    } else if distinct.len() > 3 {
        0.3
    } else {
        0.5
    }
}

/// Share of tags that appear on more than one item: all → 1.0, at least half → 0.7, else 0.4
fn style_consistency(items: &[&Item]) -> f64 {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        for tag in item.tags() {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    if counts.is_empty() {
        return 0.4;
    }

    let shared = counts.values().filter(|c| **c > 1).count();
    let ratio = shared as f64 / counts.len() as f64;

    if (ratio - 1.0).abs() < f64::EPSILON {
        1.0
    } else if ratio >= 0.5 {
        0.7
    } else {
        0.4
    }
}

/// Fraction of items mentioning a style keyword, cut to 30% on a formal/casual clash
fn style_preference_match(items: &[&Item], style: StylePreference) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let keywords = style.keywords();
    let matched = items.iter().filter(|i| i.mentions_any(keywords)).count();
    let ratio = matched as f64 / items.len() as f64;

    if has_formality_clash(items) {
        ratio * 0.3
    } else {
        ratio
    }
}

/// A formal-tagged item alongside a different casual-tagged item
fn has_formality_clash(items: &[&Item]) -> bool {
    let formal: HashSet<&str> = items
        .iter()
        .filter(|i| i.has_tag("formal"))
        .map(|i| i.id())
        .collect();
    let casual: HashSet<&str> = items
        .iter()
        .filter(|i| i.has_tag("casual"))
        .map(|i| i.id())
        .collect();

    formal
        .iter()
        .any(|f| casual.iter().any(|c| c != f))
}

fn preference_adjustment(items: &[&Item], preferences: &dyn PreferenceLookup) -> f64 {
    let scores: Vec<f64> = items
        .iter()
        .map(|i| preferences.score_item(i).clamp(0.0, 1.0))
        .collect();
    mean(&scores).unwrap_or(0.5)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn explain(
    outfit: &OutfitCandidate,
    breakdown: &ScoreBreakdown,
    weather: &WeatherSnapshot,
    style: StylePreference,
) -> String {
    let mut parts = Vec::new();

    parts.push(
        match breakdown.color_harmony {
            c if c >= 0.9 => "Neutral palette",
            c if c >= 0.8 => "Harmonious colors",
            c if c >= 0.7 => "Analogous tones",
            c if c <= 0.3 => "Busy color mix",
            _ => "Balanced colors",
        }
        .to_string(),
    );

    let temperature = weather.temperature_c.round();
    parts.push(match breakdown.weather_appropriateness {
        w if w >= 0.8 => format!("well suited to {}°C and {}", temperature, weather.condition.to_lowercase()),
        w if w >= 0.5 => format!("workable for {}°C", temperature),
        _ => format!("not ideal for {}°C", temperature),
    });

    let items: Vec<&Item> = outfit.items().collect();
    if has_formality_clash(&items) {
        parts.push("mixes formal and casual pieces".to_string());
    } else {
        parts.push(match breakdown.style_preference_match {
            s if s >= 0.7 => format!("strong {} match", style),
            s if s >= 0.4 => format!("partial {} match", style),
            _ => format!("loose {} match", style),
        });
    }

    if let Some(layer) = &outfit.outerwear {
        parts.push(format!("layered with the {}", layer.name()));
    }

    if breakdown.preference_adjustment > 0.6 {
        parts.push("close to pieces you have liked".to_string());
    } else if breakdown.preference_adjustment < 0.4 {
        parts.push("includes pieces you have passed on".to_string());
    }

    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeatherSource;

    fn weather(temperature_c: f64) -> WeatherSnapshot {
        WeatherSnapshot::new(temperature_c, "Clear", 300, WeatherSource::Label)
    }

    fn item(id: &str, name: &str, category: Category, color: &str, tags: &[&str]) -> Item {
        Item::owned(id, name, category, color).with_tags(tags.iter().copied())
    }

    struct FixedPreferences(f64);

    impl PreferenceLookup for FixedPreferences {
        fn score_item(&self, _item: &Item) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = ScoringWeights {
            color_harmony: 0.4,
            ..ScoringWeights::default()
        };
        assert!(matches!(weights.validate(), Err(AppError::InvalidConfiguration(_))));

        let negative = ScoringWeights {
            color_harmony: -0.25,
            style_preference_match: 0.70,
            ..ScoringWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_color_harmony_rules() {
        let white = item("1", "Tee", Category::Top, "white", &[]);
        let navy = item("2", "Trousers", Category::Bottom, "navy", &[]);
        let red = item("3", "Knit", Category::Top, "red", &[]);
        let red_2 = item("4", "Skirt", Category::Bottom, "red", &[]);
        let green = item("5", "Pants", Category::Bottom, "green", &[]);
        let rust = item("6", "Jacket", Category::Outerwear, "rust", &[]);
        let purple = item("7", "Scarf", Category::Accessory, "purple", &[]);
        let blue = item("8", "Shoes", Category::Shoes, "blue", &[]);
        let pink = item("9", "Hat", Category::Accessory, "pink", &[]);

        assert_eq!(color_harmony(&[&white, &navy]), 0.9);
        assert_eq!(color_harmony(&[&white, &red]), 0.9);
        assert_eq!(color_harmony(&[&red, &red_2, &white]), 0.8);
        assert_eq!(color_harmony(&[&red, &green, &white]), 0.8);
        assert_eq!(color_harmony(&[&red, &rust, &white]), 0.7);
        assert_eq!(color_harmony(&[&green, &blue]), 0.5);
    }

    #[test]
    fn test_color_harmony_any_pair_in_larger_sets() {
        let color = |id: &str, c: &str| item(id, "Piece", Category::Accessory, c, &[]);
        let (red, green, yellow) = (color("1", "red"), color("2", "green"), color("3", "yellow"));
        let (rust, blue, purple, pink) =
            (color("4", "rust"), color("5", "blue"), color("6", "purple"), color("7", "pink"));
        let (mustard, magenta) = (color("8", "mustard"), color("9", "magenta"));

        assert_eq!(color_harmony(&[&red, &green, &yellow]), 0.8);
        assert_eq!(color_harmony(&[&red, &rust, &blue]), 0.7);
        assert_eq!(color_harmony(&[&green, &purple, &pink, &blue]), 0.8);
        assert_eq!(color_harmony(&[&mustard, &green, &blue, &magenta]), 0.3);
        assert_eq!(color_harmony(&[&red, &yellow, &blue]), 0.5);
    }

    #[test]
    fn test_hue_distance_wraps() {
        assert_eq!(hue_distance(350.0, 10.0), 20.0);
        assert_eq!(hue_distance(0.0, 180.0), 180.0);
    }

    #[test]
    fn test_style_consistency_levels() {
        let a = item("1", "A", Category::Top, "white", &["formal", "professional"]);
        let b = item("2", "B", Category::Bottom, "navy", &["formal", "professional"]);
        let c = item("3", "C", Category::Bottom, "navy", &["formal", "office"]);
        let d = item("4", "D", Category::Bottom, "navy", &["beach", "summer", "linen"]);
        let bare = item("5", "E", Category::Bottom, "navy", &[]);

        assert_eq!(style_consistency(&[&a, &b]), 1.0);
        assert_eq!(style_consistency(&[&a, &c]), 0.4);
        assert_eq!(style_consistency(&[&a, &b, &c]), 0.7);
        assert_eq!(style_consistency(&[&a, &d]), 0.4);
        assert_eq!(style_consistency(&[&bare, &bare.clone()]), 0.4);
    }

    #[test]
    fn test_style_match_penalizes_formality_clash() {
        let formal = item("1", "Oxford Shirt", Category::Top, "white", &["formal"]);
        let casual = item("2", "Chino", Category::Bottom, "tan", &["casual"]);
        let clean = item("3", "Trouser", Category::Bottom, "grey", &["formal"]);

        let clash = style_preference_match(&[&formal, &casual], StylePreference::Professional);
        let no_clash = style_preference_match(&[&formal, &clean], StylePreference::Professional);

        assert!((clash - 0.3).abs() < 1e-9);
        assert_eq!(no_clash, 1.0);
    }

    #[test]
    fn test_single_item_tagged_both_is_not_a_clash() {
        let both = item("1", "Knit Polo", Category::Top, "white", &["formal", "casual"]);
        let plain = item("2", "Trouser", Category::Bottom, "grey", &[]);
        assert!(!has_formality_clash(&[&both, &plain]));
    }

    #[test]
    fn test_cold_weather_rewards_layering() {
        let scorer = Scorer::default();
        let tee = item("1", "Graphic Tee", Category::Top, "white", &[]);
        let jeans = item("2", "Jeans", Category::Bottom, "blue", &[]);
        let coat = item("3", "Wool Coat", Category::Outerwear, "camel", &[]);

        let bare = OutfitCandidate::new(tee.clone(), jeans.clone());
        let layered = OutfitCandidate::new(tee, jeans).with_outerwear(coat);

        let cold = weather(5.0);
        assert!(
            scorer.weather_appropriateness(&layered, &cold)
                > scorer.weather_appropriateness(&bare, &cold)
        );
    }

    #[test]
    fn test_hot_weather_prefers_shorts_and_tees() {
        let scorer = Scorer::default();
        let tee = item("1", "Linen Tee", Category::Top, "white", &[]);
        let shorts = item("2", "Denim Shorts", Category::Bottom, "blue", &[]);
        let trousers = item("3", "Wool Trousers", Category::Bottom, "grey", &[]);
        let hot = weather(30.0);

        let summer = OutfitCandidate::new(tee.clone(), shorts);
        let heavy = OutfitCandidate::new(tee, trousers);
        assert!(
            scorer.weather_appropriateness(&summer, &hot)
                > scorer.weather_appropriateness(&heavy, &hot)
        );
    }

    #[test]
    fn test_item_weather_range_adjusts_score() {
        let scorer = Scorer::default();
        let in_range = item("1", "Top", Category::Top, "white", &[]).with_weather_range(
            crate::models::WeatherRange {
                min_temp_c: 15.0,
                max_temp_c: 22.0,
                conditions: vec![],
            },
        );
        let out_of_range = item("2", "Top", Category::Top, "white", &[]).with_weather_range(
            crate::models::WeatherRange {
                min_temp_c: 25.0,
                max_temp_c: 35.0,
                conditions: vec![],
            },
        );
        let bottom = item("3", "Trouser", Category::Bottom, "grey", &[]);
        let mild = weather(18.0);

        let good = OutfitCandidate::new(in_range, bottom.clone());
        let bad = OutfitCandidate::new(out_of_range, bottom);
        assert!(scorer.weather_appropriateness(&good, &mild) > scorer.weather_appropriateness(&bad, &mild));
    }

    #[test]
    fn test_professional_outfit_with_outerwear_scores_higher_in_cold() {
        let scorer = Scorer::default();
        let shirt = item(
            "shirt",
            "White Shirt",
            Category::Top,
            "white",
            &["formal", "professional", "long-sleeve"],
        );
        let trousers = item(
            "trousers",
            "Navy Trousers",
            Category::Bottom,
            "navy",
            &["formal", "professional"],
        );
        let blazer = item(
            "blazer",
            "Charcoal Blazer",
            Category::Outerwear,
            "charcoal",
            &["formal", "professional"],
        );
        let cold = weather(10.0);

        let bare = OutfitCandidate::new(shirt.clone(), trousers.clone());
        let layered = OutfitCandidate::new(shirt, trousers).with_outerwear(blazer);

        let (bare_score, _) = scorer.score(&bare, &cold, StylePreference::Professional, &NeutralPreferences);
        let (layered_score, breakdown) =
            scorer.score(&layered, &cold, StylePreference::Professional, &NeutralPreferences);

        assert!(layered_score > bare_score);
        assert_eq!(breakdown.color_harmony, 0.9);
    }

    #[test]
    fn test_composite_stays_in_unit_interval() {
        let scorer = Scorer::default();
        let top = item("1", "Tee", Category::Top, "white", &["casual"]);
        let bottom = item("2", "Jeans", Category::Bottom, "blue", &["casual"]);
        let outfit = OutfitCandidate::new(top, bottom);

        for pref in [-3.0, 0.0, 0.5, 1.0, 7.0] {
            let (score, breakdown) =
                scorer.score(&outfit, &weather(18.0), StylePreference::Casual, &FixedPreferences(pref));
            assert!((0.0..=1.0).contains(&score));
            assert!((0.0..=1.0).contains(&breakdown.preference_adjustment));
        }
    }

    #[test]
    fn test_preference_adjustment_moves_score() {
        let scorer = Scorer::default();
        let outfit = OutfitCandidate::new(
            item("1", "Tee", Category::Top, "white", &[]),
            item("2", "Jeans", Category::Bottom, "blue", &[]),
        );
        let (liked, _) = scorer.score(&outfit, &weather(18.0), StylePreference::Casual, &FixedPreferences(1.0));
        let (disliked, _) = scorer.score(&outfit, &weather(18.0), StylePreference::Casual, &FixedPreferences(0.0));
        assert!((liked - disliked - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_score_outfit_explains_layering() {
        let scorer = Scorer::default();
        let outfit = OutfitCandidate::new(
            item("1", "Knit", Category::Top, "grey", &["long-sleeve"]),
            item("2", "Chino", Category::Bottom, "tan", &[]),
        )
        .with_outerwear(item("3", "Rain Shell", Category::Outerwear, "olive", &["waterproof"]));

        let rainy = WeatherSnapshot::new(9.0, "Rain", 300, WeatherSource::Label);
        let scored = scorer.score_outfit(outfit, &rainy, StylePreference::Casual, &NeutralPreferences);

        assert!(scored.reasoning.contains("layered with the Rain Shell"));
        assert_eq!(scored.signature.as_str(), "1,2,3");
    }
}
