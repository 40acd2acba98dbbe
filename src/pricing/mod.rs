//! Pricing and cost accounting.
//!
//! This module owns everything money-related: the OpenRouter catalog
//! resolver with its process-wide cache, the ruble cost engine, and the
//! heuristic pre-flight token estimator.

pub mod catalog;
pub mod cost;
pub mod estimate;

pub use catalog::{ModelPricing, PricingResolver};
pub use cost::{CostBreakdown, CostEngine, UsageInfo};
pub use estimate::{estimate_prompt_tokens, estimate_tokens, DEFAULT_COMPLETION_TOKENS};
