//! OpenRouter model catalog resolver.
//!
//! Per-model unit prices come from the catalog endpoint. The first lookup
//! for a model fetches the full catalog and caches the matching entry;
//! every later lookup is served from the cache. Entries never expire and
//! are only removed by an explicit [`PricingResolver::clear`]. A transient
//! mispriced catalog entry therefore persists for the process lifetime -
//! documented limitation, not a bug to silently work around.

use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;

/// Timeout for a single catalog fetch.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-token unit prices for one model, in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// USD per prompt token.
    pub prompt: f64,
    /// USD per completion token.
    pub completion: f64,
    /// Fixed USD charge per request, independent of token counts.
    pub request: f64,
}

/// One entry of the catalog response.
#[derive(Debug, Deserialize)]
struct CatalogModel {
    id: String,
    canonical_slug: Option<String>,
    pricing: Option<CatalogPricing>,
}

/// Raw pricing fields as the catalog publishes them: string-encoded decimals.
#[derive(Debug, Deserialize)]
struct CatalogPricing {
    prompt: Option<String>,
    completion: Option<String>,
    request: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    data: Vec<CatalogModel>,
}

impl CatalogPricing {
    /// Convert string-encoded decimals; missing or unparseable fields become 0.
    fn to_model_pricing(&self) -> ModelPricing {
        fn parse(field: &Option<String>) -> f64 {
            field
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0)
        }

        ModelPricing {
            prompt: parse(&self.prompt),
            completion: parse(&self.completion),
            request: parse(&self.request),
        }
    }
}

/// Fetches and caches per-model pricing from the OpenRouter catalog.
///
/// The cache is write-once per key and shared across requests. Concurrent
/// first-time misses for the same model may issue redundant fetches; the
/// first writer wins the slot. Not deduplicated by design.
pub struct PricingResolver {
    client: reqwest::Client,
    models_url: String,
    cache: DashMap<String, ModelPricing>,
}

impl PricingResolver {
    pub fn new(client: reqwest::Client, models_url: String) -> Self {
        Self {
            client,
            models_url,
            cache: DashMap::new(),
        }
    }

    /// Look up pricing for a model, fetching the catalog on a cache miss.
    ///
    /// Returns `None` on network failure, a non-200 catalog response, or
    /// an unknown model. Callers must treat `None` as "cost unknown",
    /// never as a fatal error.
    pub async fn get_pricing(&self, model_id: &str) -> Option<ModelPricing> {
        if let Some(cached) = self.cache.get(model_id) {
            return Some(*cached);
        }

        let pricing = self.fetch_pricing(model_id).await?;

        // entry() keeps write-once semantics under concurrent misses.
        let entry = self
            .cache
            .entry(model_id.to_string())
            .or_insert(pricing);
        Some(*entry)
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.cache.clear();
    }

    async fn fetch_pricing(&self, model_id: &str) -> Option<ModelPricing> {
        let response = match self
            .client
            .get(&self.models_url)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch model catalog");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Model catalog returned non-200");
            return None;
        }

        let catalog: CatalogResponse = match response.json().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse model catalog");
                return None;
            }
        };

        // Linear scan, first match on either the id or the canonical alias.
        let matched = catalog.data.iter().find(|m| {
            m.id == model_id || m.canonical_slug.as_deref() == Some(model_id)
        })?;

        let pricing = matched.pricing.as_ref()?.to_model_pricing();
        tracing::debug!(
            model = %model_id,
            prompt = pricing.prompt,
            completion = pricing.completion,
            request = pricing.request,
            "Resolved model pricing"
        );
        Some(pricing)
    }
}
