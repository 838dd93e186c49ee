//! Candidate generation, de-duplication and ranking.
//!
//! The combiner forms every top × bottom pair, layers outerwear when it is cool
//! enough, scores each candidate and selects a batch that never repeats a
//! signature, never shows the same piece twice in a row and always contains at
//! least one retailer item when the pools offer any. It never returns an empty
//! list: missing inventory or an all-rejected batch yields a fixed basics set.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    models::{
        Category, CategoryPools, Item, OutfitCandidate, OutfitSignature, ScoredOutfit,
        StylePreference, WeatherSnapshot,
    },
    services::scorer::{NeutralPreferences, PreferenceLookup, Scorer},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinerConfig {
    /// Minimum composite score for a candidate to be accepted outright
    pub acceptance_threshold: f64,
    /// Accepted candidates are topped up to this size with the next-best rejects
    pub min_batch_size: usize,
    /// Best-scoring outerwear layers tried per pair
    pub outerwear_variety: usize,
    /// Below this temperature pairs are also offered with a layer
    pub layering_threshold_c: f64,
    /// Below this temperature a layered variant replaces the bare pair
    pub cold_threshold_c: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            min_batch_size: 20,
            outerwear_variety: 5,
            layering_threshold_c: 20.0,
            cold_threshold_c: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub outfits: Vec<ScoredOutfit>,
    /// True when the fixed basics set was returned instead of real candidates
    pub degraded: bool,
}

pub struct OutfitCombiner {
    scorer: Scorer,
    config: CombinerConfig,
}

impl OutfitCombiner {
    pub fn new(scorer: Scorer, config: CombinerConfig) -> Self {
        Self { scorer, config }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Ranked, de-duplicated outfits for one request.
    ///
    /// `previously_shown` may hold full signatures including shoes and accessories;
    /// they are compared on their core pieces only.
    #[allow(clippy::too_many_arguments)]
    pub fn generate<R: Rng + ?Sized>(
        &self,
        pools: &CategoryPools,
        weather: &WeatherSnapshot,
        style: StylePreference,
        previously_shown: &HashSet<OutfitSignature>,
        target_count: usize,
        preferences: &dyn PreferenceLookup,
        rng: &mut R,
    ) -> GenerationOutcome {
        let target_count = target_count.max(1);

        if !pools.has_required() {
            tracing::info!(
                tops = pools.tops.len(),
                bottoms = pools.bottoms.len(),
                "Insufficient inventory, returning basics"
            );
            return self.fallback(weather, style);
        }

        let shown = core_signatures(previously_shown, pools);
        let mut candidates = self.candidates(pools, weather, style, &shown, preferences);
        let total_candidates = candidates.len();

        // Shuffle first so the stable sort breaks score ties randomly
        candidates.shuffle(rng);
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let accepted = candidates
            .iter()
            .take_while(|c| c.score >= self.config.acceptance_threshold)
            .count();
        if accepted == 0 {
            tracing::info!(
                candidates = total_candidates,
                threshold = self.config.acceptance_threshold,
                "No candidate reached the acceptance threshold, returning basics"
            );
            return self.fallback(weather, style);
        }

        let keep = accepted.max(self.config.min_batch_size.min(candidates.len()));
        let remainder = candidates.split_off(keep);

        let mut ordered = spread_repeats(candidates);
        let mut overflow = ordered.split_off(target_count.min(ordered.len()));

        if pools.has_external() && !ordered.iter().any(|c| c.outfit.contains_external()) {
            overflow.extend(remainder);
            if promote_external(&mut ordered, &mut overflow) {
                ordered = spread_repeats(ordered);
                ordered.truncate(target_count);
            }
        }

        let outfits: Vec<ScoredOutfit> = ordered
            .into_iter()
            .map(|outfit| self.finish(outfit, pools, weather, style, preferences))
            .collect();

        tracing::debug!(
            candidates = total_candidates,
            accepted,
            returned = outfits.len(),
            "Outfits generated"
        );

        GenerationOutcome {
            outfits,
            degraded: false,
        }
    }

    /// Scored candidates with unique core signatures, excluding anything already shown
    fn candidates(
        &self,
        pools: &CategoryPools,
        weather: &WeatherSnapshot,
        style: StylePreference,
        shown: &HashSet<OutfitSignature>,
        preferences: &dyn PreferenceLookup,
    ) -> Vec<ScoredOutfit> {
        let temperature = weather.temperature_c;
        let layering = temperature < self.config.layering_threshold_c && !pools.outerwear.is_empty();
        let replace_bare = layering && temperature < self.config.cold_threshold_c;

        let mut used: HashSet<OutfitSignature> = HashSet::new();
        let mut candidates = Vec::new();

        for top in &pools.tops {
            for bottom in &pools.bottoms {
                let pair = OutfitCandidate::new(top.clone(), bottom.clone());
                let mut layered_any = false;

                if layering {
                    let mut layers: Vec<ScoredOutfit> = pools
                        .outerwear
                        .iter()
                        .map(|layer| {
                            self.scorer.score_outfit(
                                pair.clone().with_outerwear(layer.clone()),
                                weather,
                                style,
                                preferences,
                            )
                        })
                        .collect();
                    layers.sort_by(|a, b| b.score.total_cmp(&a.score));

                    for layered in layers.into_iter().take(self.config.outerwear_variety) {
                        let core = layered.outfit.core_signature();
                        if shown.contains(&core) || !used.insert(core) {
                            continue;
                        }
                        layered_any = true;
                        candidates.push(layered);
                    }
                }

                if replace_bare && layered_any {
                    continue;
                }

                let core = pair.core_signature();
                if shown.contains(&core) || !used.insert(core) {
                    continue;
                }
                candidates.push(self.scorer.score_outfit(pair, weather, style, preferences));
            }
        }

        candidates
    }

    /// Adds the best shoes, then the best accessory, whenever that does not lower the score
    fn finish(
        &self,
        scored: ScoredOutfit,
        pools: &CategoryPools,
        weather: &WeatherSnapshot,
        style: StylePreference,
        preferences: &dyn PreferenceLookup,
    ) -> ScoredOutfit {
        let with_shoes = self.best_addition(scored, &pools.shoes, weather, style, preferences);
        self.best_addition(with_shoes, &pools.accessories, weather, style, preferences)
    }

    fn best_addition(
        &self,
        scored: ScoredOutfit,
        pool: &[Item],
        weather: &WeatherSnapshot,
        style: StylePreference,
        preferences: &dyn PreferenceLookup,
    ) -> ScoredOutfit {
        let best = pool
            .iter()
            .map(|item| {
                let outfit = match item.category() {
                    Category::Shoes => scored.outfit.clone().with_shoes(item.clone()),
                    _ => scored.outfit.clone().with_accessory(item.clone()),
                };
                self.scorer.score_outfit(outfit, weather, style, preferences)
            })
            .max_by(|a, b| a.score.total_cmp(&b.score));

        match best {
            Some(best) if best.score >= scored.score => best,
            _ => scored,
        }
    }

    fn fallback(&self, weather: &WeatherSnapshot, style: StylePreference) -> GenerationOutcome {
        GenerationOutcome {
            outfits: fallback_outfits(&self.scorer, weather, style),
            degraded: true,
        }
    }
}

/// The two wardrobe-basics outfits returned whenever real candidates are unavailable
pub fn fallback_outfits(
    scorer: &Scorer,
    weather: &WeatherSnapshot,
    style: StylePreference,
) -> Vec<ScoredOutfit> {
    let basics = [
        OutfitCandidate::new(
            Item::owned("basics-white-tee", "White Tee", Category::Top, "white")
                .with_tags(["casual", "short-sleeve"]),
            Item::owned("basics-blue-jeans", "Blue Jeans", Category::Bottom, "blue")
                .with_tags(["casual", "denim"]),
        ),
        OutfitCandidate::new(
            Item::owned("basics-grey-knit", "Grey Knit", Category::Top, "grey")
                .with_tags(["smart", "long-sleeve"]),
            Item::owned("basics-charcoal-trousers", "Charcoal Trousers", Category::Bottom, "charcoal")
                .with_tags(["smart", "tailored"]),
        ),
    ];

    basics
        .into_iter()
        .map(|outfit| {
            let mut scored = scorer.score_outfit(outfit, weather, style, &NeutralPreferences);
            scored.reasoning = format!("Wardrobe basics; {}", scored.reasoning);
            scored
        })
        .collect()
}

/// Moves the best retailer-sourced candidate from `overflow` to the front,
/// preferring one with a retailer bottom. Returns false when none is left.
fn promote_external(ordered: &mut Vec<ScoredOutfit>, overflow: &mut Vec<ScoredOutfit>) -> bool {
    let position = overflow
        .iter()
        .position(|c| c.outfit.bottom.is_external())
        .or_else(|| overflow.iter().position(|c| c.outfit.contains_external()));

    match position {
        Some(position) => {
            let promoted = overflow.remove(position);
            tracing::debug!(signature = %promoted.signature, "Promoting retailer outfit");
            ordered.insert(0, promoted);
            true
        }
        None => {
            tracing::debug!("No unseen retailer outfit available");
            false
        }
    }
}

/// Normalizes shown signatures to core pieces, dropping ids the pools know as shoes or accessories
fn core_signatures(
    previously_shown: &HashSet<OutfitSignature>,
    pools: &CategoryPools,
) -> HashSet<OutfitSignature> {
    let finishing: HashSet<&str> = pools
        .shoes
        .iter()
        .chain(&pools.accessories)
        .map(Item::id)
        .collect();

    previously_shown
        .iter()
        .map(|signature| {
            OutfitSignature::from_ids(signature.ids().filter(|id| !finishing.contains(id)))
        })
        .collect()
}

/// Greedy reorder so consecutive outfits never share a top, bottom or outerwear.
/// Falls back to rank order only when no remaining outfit can follow the last one.
fn spread_repeats(ranked: Vec<ScoredOutfit>) -> Vec<ScoredOutfit> {
    let mut remaining = ranked;
    let mut ordered: Vec<ScoredOutfit> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = match ordered.last() {
            None => 0,
            Some(last) => remaining
                .iter()
                .position(|c| !c.outfit.shares_core_piece(&last.outfit))
                .unwrap_or_else(|| {
                    tracing::debug!("No non-repeating outfit left, relaxing adjacency");
                    0
                }),
        };
        ordered.push(remaining.remove(next));
    }

    ordered
}
