//! HTTP request handlers.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::messages::{apply_truncation_warning, build_messages, compose_system_prompt};
use super::relay::{run_relay, SseFrame};
use super::server::AppState;
use super::types::{
    ChatRequest, ChatResponse, CompletionPayload, CostSummary, EstimateRequest, EstimateResponse,
};
use crate::error::Error;
use crate::pricing::{estimate_prompt_tokens, DEFAULT_COMPLETION_TOKENS};

/// Response header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-kopek-request-id";

/// Buffer between the relay task and the SSE response body.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Validate the caller-supplied generation parameters.
///
/// Violations never reach OpenRouter. A `max_tokens` of 0 means "no cap"
/// and is normalized to absent by [`build_payload`].
fn validate_request(request: &ChatRequest) -> Result<(), Error> {
    if request.message.trim().is_empty() {
        return Err(Error::BadRequest("'message' is required".to_string()));
    }
    if request.model.trim().is_empty() {
        return Err(Error::BadRequest("'model' is required".to_string()));
    }
    if let Some(t) = request.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(Error::BadRequest(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
    }
    if let Some(max_tokens) = request.max_tokens {
        if max_tokens != 0 && !(1..=4000).contains(&max_tokens) {
            return Err(Error::BadRequest(
                "max_tokens must be between 1 and 4000".to_string(),
            ));
        }
    }
    if let Some(verbosity) = &request.verbosity {
        if !matches!(verbosity.as_str(), "low" | "medium" | "high") {
            return Err(Error::BadRequest(
                "verbosity must be one of: low, medium, high".to_string(),
            ));
        }
    }
    if let Some(fp) = request.frequency_penalty {
        if !(-2.0..=2.0).contains(&fp) {
            return Err(Error::BadRequest(
                "frequency_penalty must be between -2.0 and 2.0".to_string(),
            ));
        }
    }
    if let Some(top_p) = request.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(Error::BadRequest(
                "top_p must be between 0.0 and 1.0".to_string(),
            ));
        }
    }
    Ok(())
}

/// Resolve the effective system prompt for a request.
fn system_prompt_for(state: &AppState, use_system_prompt: Option<bool>, style: Option<&str>) -> String {
    if use_system_prompt == Some(false) {
        return compose_system_prompt("", style);
    }
    compose_system_prompt(&state.prompts.get(), style)
}

/// Build the upstream payload from a validated request.
fn build_payload(state: &AppState, request: &ChatRequest, stream: bool) -> CompletionPayload {
    let system_prompt =
        system_prompt_for(state, request.use_system_prompt, request.style.as_deref());
    let messages = build_messages(&system_prompt, &request.history, &request.message);

    CompletionPayload {
        model: request.model.clone(),
        messages,
        stream,
        temperature: request.temperature,
        max_tokens: request.max_tokens.filter(|&m| m != 0),
        top_p: request.top_p,
        frequency_penalty: request.frequency_penalty,
        verbosity: request.verbosity.clone(),
    }
}

/// Handle POST /api/chat - buffered completion.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, Error> {
    let request_id = Uuid::new_v4().to_string();
    validate_request(&request)?;

    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        history_len = request.history.len(),
        "Received chat request"
    );

    let payload = build_payload(&state, &request, false);
    let completion = state.upstream.send_buffered(&payload).await?;

    let model = completion.model.clone().unwrap_or_else(|| request.model.clone());
    let choice = completion.choices.into_iter().next().ok_or_else(|| {
        Error::Internal("Unexpected response format from OpenRouter: no choices".to_string())
    })?;

    let mut content = choice.message.content;
    let finish_reason = choice.finish_reason.unwrap_or_else(|| "unknown".to_string());
    apply_truncation_warning(&mut content, &finish_reason);

    // Cost is omitted, never zeroed, when pricing or usage is unknown.
    let cost = match &completion.usage {
        Some(usage) => state
            .cost
            .cost(usage, &model)
            .await
            .map(|breakdown| CostSummary::new(breakdown.total_cost_rub, usage)),
        None => None,
    };

    if let Some(cost) = &cost {
        tracing::info!(
            request_id = %request_id,
            model = %model,
            prompt_tokens = cost.prompt_tokens,
            completion_tokens = cost.completion_tokens,
            total_tokens = cost.total_tokens,
            total_cost_rub = cost.total_cost_rub,
            "Chat request cost"
        );
    } else {
        tracing::warn!(request_id = %request_id, model = %model, "Cost unavailable for request");
    }

    let body = ChatResponse {
        content,
        model,
        finish_reason,
        cost,
    };

    Ok(([(REQUEST_ID_HEADER, request_id)], Json(body)).into_response())
}

/// Handle POST /api/chat/stream - SSE relay.
///
/// Validation failures surface as a plain 400 JSON response; once the SSE
/// response has started, all failures arrive as in-stream error events.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, Error> {
    let request_id = Uuid::new_v4().to_string();
    validate_request(&request)?;

    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        history_len = request.history.len(),
        "Received streaming chat request"
    );

    let payload = build_payload(&state, &request, true);
    let model = request.model.clone();
    let task_request_id = request_id.clone();
    let (tx, rx) = mpsc::channel::<SseFrame>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let response = match state.upstream.open_stream(&payload).await {
            Ok(response) => response,
            Err(e) => {
                let event = super::types::StreamEvent::Error {
                    message: e.to_string(),
                    status_code: e.status_code().as_u16(),
                };
                let _ = tx.send(SseFrame::Event(event)).await;
                return;
            }
        };

        let final_state = run_relay(response, model, state.cost.clone(), tx).await;
        tracing::debug!(request_id = %task_request_id, state = ?final_state, "Relay finished");
    });

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(|frame| Ok::<_, std::convert::Infallible>(frame.to_wire())),
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .header(REQUEST_ID_HEADER, request_id)
        .body(body)
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(response)
}

/// Handle POST /api/chat/estimate - pre-flight cost estimate.
///
/// Uses heuristic token counts, never real usage. An unknown model yields
/// token figures with a null cost rather than an error.
pub async fn chat_estimate(
    State(state): State<AppState>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<EstimateResponse>, Error> {
    if request.message.trim().is_empty() {
        return Err(Error::BadRequest("'message' is required".to_string()));
    }
    if request.model.trim().is_empty() {
        return Err(Error::BadRequest("'model' is required".to_string()));
    }

    let system_prompt =
        system_prompt_for(&state, request.use_system_prompt, request.style.as_deref());

    // Estimate over the same capped history the real request would send.
    let tail = request
        .history
        .len()
        .saturating_sub(super::messages::HISTORY_CAP);
    let history = request.history[tail..].iter().map(|m| m.content.as_str());

    let prompt_tokens = estimate_prompt_tokens(&system_prompt, history, &request.message);
    let completion_tokens = match request.max_tokens {
        Some(cap) if cap != 0 => cap,
        _ => DEFAULT_COMPLETION_TOKENS,
    };

    let estimated_cost = state
        .cost
        .estimate_cost(prompt_tokens, completion_tokens, &request.model)
        .await;

    Ok(Json(EstimateResponse {
        estimated_cost,
        estimated_prompt_tokens: prompt_tokens,
        estimated_completion_tokens: completion_tokens,
        estimated_total_tokens: prompt_tokens + completion_tokens,
    }))
}

/// Handle GET /api/system-prompt - expose the active system prompt.
pub async fn system_prompt(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "system_prompt": state.prompts.get(),
    }))
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kopek"
    }))
}
