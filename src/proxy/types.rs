//! Request, response, and stream event types.

use serde::{Deserialize, Serialize};

use crate::pricing::UsageInfo;

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message as sent to OpenRouter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Incoming chat request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    /// Prior conversation turns, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    /// 0 or absent means "no cap".
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub verbosity: Option<String>,
    /// Include the configured system prompt. Defaults to true.
    pub use_system_prompt: Option<bool>,
    /// Optional style addendum appended to the system prompt.
    pub style: Option<String>,
}

/// Incoming pre-flight cost estimate request.
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    pub message: String,
    pub model: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub use_system_prompt: Option<bool>,
    pub style: Option<String>,
}

/// Payload sent to the OpenRouter completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

/// Buffered completion response from OpenRouter.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<UsageInfo>,
}

/// A completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

/// The message of a completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: String,
}

/// Cost figures attached to client responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_cost_rub: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl CostSummary {
    pub fn new(total_cost_rub: f64, usage: &UsageInfo) -> Self {
        Self {
            total_cost_rub,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Outward buffered chat response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: String,
    /// Omitted, not zeroed, when pricing is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostSummary>,
}

/// Outward pre-flight estimate response.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateResponse {
    /// Null when pricing for the model is unavailable.
    pub estimated_cost: Option<f64>,
    pub estimated_prompt_tokens: u32,
    pub estimated_completion_tokens: u32,
    pub estimated_total_tokens: u32,
}

/// One semantic event of the streaming relay. All variants but `Token`
/// are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token {
        text: String,
    },
    Done {
        model: String,
        finish_reason: Option<String>,
        cost: Option<CostSummary>,
    },
    Error {
        message: String,
        status_code: u16,
    },
}

impl StreamEvent {
    /// Render this event as an SSE `data:` frame.
    pub fn to_sse(&self) -> String {
        let json = match self {
            StreamEvent::Token { text } => serde_json::json!({
                "token": text,
                "done": false,
            }),
            StreamEvent::Done {
                model,
                finish_reason,
                cost,
            } => {
                let mut frame = serde_json::json!({
                    "token": "",
                    "done": true,
                    "model": model,
                    "finish_reason": finish_reason,
                });
                if let Some(cost) = cost {
                    frame["cost"] = serde_json::to_value(cost).unwrap_or_default();
                }
                frame
            }
            StreamEvent::Error {
                message,
                status_code,
            } => serde_json::json!({
                "error": message,
                "status_code": status_code,
            }),
        };
        format!("data: {}\n\n", json)
    }
}
