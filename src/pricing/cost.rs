//! Ruble cost engine.
//!
//! Converts token counts into ruble amounts using catalog unit prices and
//! a fixed USD-to-RUB exchange rate. Each USD component is converted and
//! rounded to kopecks independently, then the total is the sum of the
//! rounded components, rounded again. The double rounding can disagree
//! with rounding the raw total once by a kopeck; the order is kept for
//! compatibility with the existing billing output.

use serde::{Deserialize, Serialize};

use super::catalog::{ModelPricing, PricingResolver};

/// Token usage for one exchange, exact (from the gateway) or estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Ruble cost of one exchange, rounded to kopecks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub total_cost_rub: f64,
    pub prompt_cost_rub: f64,
    pub completion_cost_rub: f64,
    pub request_cost_rub: f64,
}

/// Round to 2 decimal places (kopecks).
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Cost engine bound to a pricing resolver and a fixed exchange rate.
pub struct CostEngine {
    resolver: PricingResolver,
    usd_to_rub: f64,
}

impl CostEngine {
    pub fn new(resolver: PricingResolver, usd_to_rub: f64) -> Self {
        Self { resolver, usd_to_rub }
    }

    /// The underlying pricing resolver.
    pub fn resolver(&self) -> &PricingResolver {
        &self.resolver
    }

    /// Cost of an exchange from real usage. `None` when pricing is unknown.
    pub async fn cost(&self, usage: &UsageInfo, model_id: &str) -> Option<CostBreakdown> {
        let pricing = self.resolver.get_pricing(model_id).await?;
        Some(breakdown(usage, &pricing, self.usd_to_rub))
    }

    /// Pre-flight estimate from heuristic token counts. Returns only the
    /// aggregate ruble figure; per-component figures are meaningless for
    /// an estimate.
    pub async fn estimate_cost(
        &self,
        prompt_tokens: u32,
        completion_tokens: u32,
        model_id: &str,
    ) -> Option<f64> {
        let pricing = self.resolver.get_pricing(model_id).await?;
        let usage = UsageInfo {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        };
        Some(breakdown(&usage, &pricing, self.usd_to_rub).total_cost_rub)
    }
}

/// Compute the rounded ruble breakdown for a usage/pricing pair.
///
/// Rounding happens after currency conversion, per component, and the
/// total re-rounds the sum of the rounded components.
pub fn breakdown(usage: &UsageInfo, pricing: &ModelPricing, usd_to_rub: f64) -> CostBreakdown {
    let prompt_cost_rub = round2(usage.prompt_tokens as f64 * pricing.prompt * usd_to_rub);
    let completion_cost_rub =
        round2(usage.completion_tokens as f64 * pricing.completion * usd_to_rub);
    let request_cost_rub = round2(pricing.request * usd_to_rub);

    CostBreakdown {
        total_cost_rub: round2(prompt_cost_rub + completion_cost_rub + request_cost_rub),
        prompt_cost_rub,
        completion_cost_rub,
        request_cost_rub,
    }
}
