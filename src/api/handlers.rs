use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{Item, OutfitSignature, StylePreference, Verdict},
    services::{GenerationResponse, PerformanceMetrics},
};

use super::AppState;

const DEFAULT_OUTFIT_COUNT: usize = 5;
const MAX_OUTFIT_COUNT: usize = 50;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct GenerateOutfitsRequest {
    pub occasion: String,
    #[serde(default)]
    pub weather_label: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Only the items matter; a full outfit from a generation response also parses
#[derive(Debug, Deserialize)]
pub struct SwipedOutfit {
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub user_id: String,
    pub outfit: SwipedOutfit,
    pub verdict: Verdict,
    #[serde(default)]
    pub style_preference: Option<StylePreference>,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub signature: OutfitSignature,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Generate ranked outfits for an occasion
pub async fn generate_outfits(
    State(state): State<AppState>,
    Json(request): Json<GenerateOutfitsRequest>,
) -> Json<GenerationResponse> {
    let count = request
        .count
        .unwrap_or(DEFAULT_OUTFIT_COUNT)
        .clamp(1, MAX_OUTFIT_COUNT);

    let response = state
        .stylist
        .generate_outfits(
            &request.occasion,
            request.weather_label.as_deref(),
            count,
            request.user_id.as_deref(),
        )
        .await;

    Json(response)
}

/// Record a like or dislike; storage happens in the background
pub async fn record_swipe(
    State(state): State<AppState>,
    Json(request): Json<SwipeRequest>,
) -> AppResult<(StatusCode, Json<SwipeResponse>)> {
    let signature = state.stylist.record_swipe(
        &request.user_id,
        &request.outfit.items,
        request.verdict,
        request.style_preference,
    )?;

    Ok((StatusCode::ACCEPTED, Json(SwipeResponse { signature })))
}

/// Cache and latency metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<PerformanceMetrics> {
    Json(state.stylist.get_performance_metrics())
}
