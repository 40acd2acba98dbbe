//! Outbound OpenRouter client.
//!
//! Two paths: a buffered call with a bounded timeout that parses the full
//! completion, and a streaming call with a longer timeout that hands the
//! live response to the relay. No retries anywhere; every failure is
//! classified once and reported once.

use std::time::Duration;

use reqwest::header;

use super::types::{CompletionPayload, CompletionResponse};
use crate::config::{ApiKey, UpstreamConfig};
use crate::error::Error;

/// Timeout for a buffered completion call.
const BUFFERED_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout covering the whole streaming exchange.
const STREAMING_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the OpenRouter completion endpoint.
pub struct UpstreamClient {
    client: reqwest::Client,
    chat_url: String,
    api_key: Option<ApiKey>,
    referer: Option<String>,
}

impl UpstreamClient {
    pub fn new(client: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            chat_url: config.chat_url.clone(),
            api_key: config.api_key.clone(),
            referer: config.referer.clone(),
        }
    }

    fn request(&self, payload: &CompletionPayload, timeout: Duration) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.chat_url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(payload);

        if let Some(key) = &self.api_key {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", key.expose_secret()),
            );
        }
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer.clone());
        }
        request
    }

    /// Send a buffered completion request and parse the response.
    pub async fn send_buffered(
        &self,
        payload: &CompletionPayload,
    ) -> Result<CompletionResponse, Error> {
        let response = self
            .request(payload, BUFFERED_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(status.as_u16(), &body);
            tracing::error!(status = %status, message = %message, "OpenRouter rejected request");
            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse OpenRouter response");
            Error::Internal(format!("Failed to parse OpenRouter response: {}", e))
        })
    }

    /// Open a streaming completion request.
    ///
    /// The HTTP status is not inspected here; the relay classifies a
    /// non-success response while still in its initial state. Dropping
    /// the returned response aborts the transfer.
    pub async fn open_stream(&self, payload: &CompletionPayload) -> Result<reqwest::Response, Error> {
        self.request(payload, STREAMING_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport_error)
    }
}

/// Map a reqwest transport error onto the error taxonomy.
fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        tracing::error!(error = %e, "OpenRouter request timed out");
        Error::UpstreamTimeout
    } else {
        tracing::error!(error = %e, "Failed to reach OpenRouter");
        Error::UpstreamUnavailable(e.to_string())
    }
}

/// Extract a human-readable message from an OpenRouter error body.
///
/// OpenRouter errors are usually `{"error": {"message": "..."}}`; a bare
/// `{"error": "..."}` is accepted too. Anything else falls back to a
/// generic message keyed to the HTTP status.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = parsed.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            if let Some(message) = error.as_str() {
                return message.to_string();
            }
        }
    }
    format!("OpenRouter request failed (HTTP {})", status)
}
