//! HTTP server setup and shared state.

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::upstream::UpstreamClient;
use crate::config::Config;
use crate::pricing::{CostEngine, PricingResolver};
use crate::prompt::PromptLoader;

/// Shared application state.
///
/// The pricing cache inside [`CostEngine`] is the only state shared
/// across requests; everything else is per-request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<UpstreamClient>,
    pub cost: Arc<CostEngine>,
    pub prompts: Arc<PromptLoader>,
}

impl AppState {
    /// Build the composition root: HTTP client, pricing cache, upstream
    /// client, and prompt loader, all owned here and passed by reference.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let resolver = PricingResolver::new(http_client.clone(), config.upstream.models_url.clone());
        let cost = CostEngine::new(resolver, config.pricing.usd_to_rub);
        let upstream = UpstreamClient::new(http_client, &config.upstream);
        let prompts = PromptLoader::new(
            config.prompt.system_prompt_file.clone().map(PathBuf::from),
        );

        Ok(Self {
            config: Arc::new(config),
            upstream: Arc::new(upstream),
            cost: Arc::new(cost),
            prompts: Arc::new(prompts),
        })
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/chat/estimate", post(handlers::chat_estimate))
        .route("/api/system-prompt", get(handlers::system_prompt))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let state = AppState::from_config(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting kopek proxy server");

    axum::serve(listener, app).await?;

    Ok(())
}
