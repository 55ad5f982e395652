//! Public catalog handlers: pipelines and pricing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use mpost_models::{PackType, Pipeline, PipelineInfo, ProcessingTier};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PipelinesResponse {
    pub pipelines: Vec<PipelineInfo>,
}

/// Available output presets.
pub async fn list_pipelines() -> Json<PipelinesResponse> {
    Json(PipelinesResponse {
        pipelines: Pipeline::ALL.iter().map(Pipeline::describe).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct PackPrice {
    pub pack_type: PackType,
    pub name: String,
    pub credits: u32,
    pub price_usd: f64,
    pub price_per_credit: f64,
    pub purchasable: bool,
}

#[derive(Debug, Serialize)]
pub struct TierRate {
    pub tier: ProcessingTier,
    pub credits_per_image: u32,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub packs: Vec<PackPrice>,
    pub tiers: Vec<TierRate>,
}

/// Credit packs and per-tier rates.
pub async fn get_pricing(State(state): State<AppState>) -> Json<PricingResponse> {
    let packs = state
        .packs
        .iter()
        .map(|pack| PackPrice {
            pack_type: pack.pack_type,
            name: pack.name.clone(),
            credits: pack.credits,
            price_usd: pack.price_usd(),
            price_per_credit: pack.price_per_credit(),
            purchasable: pack.purchasable && pack.price_id.is_some(),
        })
        .collect();

    let tiers = [ProcessingTier::Basic, ProcessingTier::Premium]
        .into_iter()
        .map(|tier| TierRate {
            tier,
            credits_per_image: tier.credits_per_image(),
            available: state.editors.supports(tier),
        })
        .collect();

    Json(PricingResponse { packs, tiers })
}
