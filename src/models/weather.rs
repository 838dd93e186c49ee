use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FALLBACK_TEMPERATURE_C: f64 = 22.0;
pub const FALLBACK_CONDITION: &str = "Partly Cloudy";

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSource {
    Live,
    Label,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub condition: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub source: WeatherSource,
}

impl WeatherSnapshot {
    pub fn new(temperature_c: f64, condition: &str, ttl_secs: u64, source: WeatherSource) -> Self {
        Self {
            temperature_c,
            condition: condition.to_string(),
            fetched_at: Utc::now(),
            ttl_secs,
            source,
        }
    }

    /// Neutral snapshot used whenever live weather cannot be obtained
    pub fn fallback() -> Self {
        Self::new(
            FALLBACK_TEMPERATURE_C,
            FALLBACK_CONDITION,
            0,
            WeatherSource::Fallback,
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.source == WeatherSource::Fallback
    }

    /// Rain, drizzle, showers, storms or snow
    pub fn is_wet(&self) -> bool {
        let condition = self.condition.to_lowercase();
        ["rain", "drizzle", "shower", "storm", "snow", "sleet"]
            .iter()
            .any(|w| condition.contains(w))
    }

    /// Cache key component: readings that land in the same climate band,
    /// layering band and wet state share generated batches
    pub fn bucket(&self, bands: &WeatherBands) -> String {
        let climate = if self.temperature_c < bands.cold_c {
            "cold"
        } else if self.temperature_c > bands.hot_c {
            "hot"
        } else {
            "mild"
        };
        let layering = if self.temperature_c < bands.layering_c {
            "layered"
        } else {
            "unlayered"
        };
        let wet = if self.is_wet() { "wet" } else { "dry" };
        format!("{}:{}:{}", climate, layering, wet)
    }
}

/// Temperature boundaries that change how outfits are generated and scored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherBands {
    /// Below this is cold
    pub cold_c: f64,
    /// Above this is hot
    pub hot_c: f64,
    /// Below this pairs are also offered with outerwear
    pub layering_c: f64,
}

impl Default for WeatherBands {
    fn default() -> Self {
        Self {
            cold_c: 15.0,
            hot_c: 20.0,
            layering_c: 20.0,
        }
    }
}

/// Weather as named by a caller instead of measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherLabel {
    Cold,
    Cool,
    Mild,
    Warm,
    Hot,
    Rainy,
    Snowy,
    Current,
}

impl WeatherLabel {
    /// Unknown or missing labels resolve to live weather
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("cold") => WeatherLabel::Cold,
            Some("cool") => WeatherLabel::Cool,
            Some("mild") => WeatherLabel::Mild,
            Some("warm") => WeatherLabel::Warm,
            Some("hot") => WeatherLabel::Hot,
            Some("rainy") | Some("rain") => WeatherLabel::Rainy,
            Some("snowy") | Some("snow") => WeatherLabel::Snowy,
            _ => WeatherLabel::Current,
        }
    }

    /// Fixed snapshot for named weather; `None` for `Current`
    pub fn snapshot(&self) -> Option<WeatherSnapshot> {
        let (temperature_c, condition) = match self {
            WeatherLabel::Cold => (5.0, "Clear"),
            WeatherLabel::Cool => (12.0, "Cloudy"),
            WeatherLabel::Mild => (18.0, "Partly Cloudy"),
            WeatherLabel::Warm => (24.0, "Sunny"),
            WeatherLabel::Hot => (30.0, "Sunny"),
            WeatherLabel::Rainy => (14.0, "Rain"),
            WeatherLabel::Snowy => (-2.0, "Snow"),
            WeatherLabel::Current => return None,
        };
        Some(WeatherSnapshot::new(
            temperature_c,
            condition,
            0,
            WeatherSource::Label,
        ))
    }
}
