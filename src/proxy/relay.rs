//! Streaming relay state machine.
//!
//! Consumes the upstream SSE byte stream, reassembles complete lines
//! across chunk boundaries, and forwards semantic events downstream as
//! they arrive. The line/state core ([`RelayMachine`]) is synchronous and
//! does no I/O; [`run_relay`] drives it against a live response, owns the
//! keep-alive timer, and attaches the final cost figure.
//!
//! States: `AwaitingHeaders -> Relaying -> {Done, Failed, Aborted}`, all
//! three terminal. A malformed data frame is dropped without leaving
//! `Relaying`; only a transport error fails the stream.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use super::types::{CostSummary, StreamEvent};
use super::upstream::extract_error_message;
use crate::pricing::{CostEngine, UsageInfo};

/// Emit an SSE comment downstream when no frame has been forwarded for
/// this long, so intermediate proxies do not time out the connection.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Relay lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    AwaitingHeaders,
    Relaying,
    Done,
    Failed,
    Aborted,
}

/// A semantic frame produced by the machine. Cost is attached later by
/// the async driver, which is the only place that can reach the pricing
/// resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Token(String),
    Done {
        model: Option<String>,
        finish_reason: Option<String>,
        usage: Option<UsageInfo>,
    },
}

/// What goes over the wire to the downstream client.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event(StreamEvent),
    KeepAlive,
}

impl SseFrame {
    /// Render as raw SSE bytes.
    pub fn to_wire(&self) -> String {
        match self {
            SseFrame::Event(event) => event.to_sse(),
            SseFrame::KeepAlive => ": keep-alive\n\n".to_string(),
        }
    }
}

/// Synchronous SSE line parser and relay state tracker.
///
/// Push raw bytes in, collect [`RelayFrame`]s out. Handles chunk
/// boundaries that split lines, CRLF endings, comment lines, and the
/// `[DONE]` sentinel.
pub struct RelayMachine {
    state: RelayState,
    buffer: Vec<u8>,
    model: Option<String>,
    finish_reason: Option<String>,
    usage: Option<UsageInfo>,
    content: String,
}

impl RelayMachine {
    pub fn new() -> Self {
        Self {
            state: RelayState::AwaitingHeaders,
            buffer: Vec::new(),
            model: None,
            finish_reason: None,
            usage: None,
            content: String::new(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Full text accumulated from token deltas so far.
    pub fn accumulated_content(&self) -> &str {
        &self.content
    }

    /// The upstream headers arrived with a success status.
    pub fn start_relaying(&mut self) {
        debug_assert_eq!(self.state, RelayState::AwaitingHeaders);
        self.state = RelayState::Relaying;
    }

    /// Terminal: upstream connection failed or responded non-success.
    pub fn mark_failed(&mut self) {
        self.state = RelayState::Failed;
    }

    /// Terminal: the downstream client disconnected.
    pub fn mark_aborted(&mut self) {
        self.state = RelayState::Aborted;
    }

    /// Feed a chunk of upstream bytes; returns frames completed by it.
    ///
    /// After a `Done` frame the machine is terminal and ignores further
    /// input.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> Vec<RelayFrame> {
        let mut frames = Vec::new();
        if self.state != RelayState::Relaying {
            return frames;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                let done = matches!(frame, RelayFrame::Done { .. });
                frames.push(frame);
                if done {
                    break;
                }
            }
        }
        frames
    }

    /// Flush a trailing unterminated line (e.g. `data: [DONE]` without a
    /// final newline) when the upstream stream ends.
    pub fn finish(&mut self) -> Option<RelayFrame> {
        if self.state != RelayState::Relaying || self.buffer.is_empty() {
            return None;
        }
        let line_bytes = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&line_bytes);
        self.process_line(line.trim_end_matches(['\n', '\r']))
    }

    fn process_line(&mut self, line: &str) -> Option<RelayFrame> {
        if line.is_empty() {
            return None;
        }
        // Comment / keep-alive from upstream: activity, but nothing to forward.
        if line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim_start();

        if data.trim() == "[DONE]" {
            self.state = RelayState::Done;
            return Some(RelayFrame::Done {
                model: self.model.take(),
                finish_reason: self.finish_reason.take(),
                usage: self.usage.take(),
            });
        }

        let chunk: serde_json::Value = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                // Corrupt but recoverable: drop the frame, keep the stream.
                tracing::debug!(error = %e, "Dropping malformed stream frame");
                return None;
            }
        };

        if let Some(model) = chunk.get("model").and_then(|m| m.as_str()) {
            self.model = Some(model.to_string());
        }
        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            if let Ok(usage) = serde_json::from_value::<UsageInfo>(usage.clone()) {
                self.usage = Some(usage);
            }
        }

        let choice = chunk.get("choices").and_then(|c| c.get(0))?;
        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        let delta = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("");
        if delta.is_empty() {
            return None;
        }

        self.content.push_str(delta);
        Some(RelayFrame::Token(delta.to_string()))
    }
}

impl Default for RelayMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive the relay against a live upstream response.
///
/// `requested_model` seeds the model reported in the final event when the
/// stream never named one. Frames are pushed into `tx`; a failed send
/// means the downstream client is gone, which aborts the relay with no
/// further reads or writes. Returns the terminal state.
pub async fn run_relay(
    response: reqwest::Response,
    requested_model: String,
    cost_engine: Arc<CostEngine>,
    tx: mpsc::Sender<SseFrame>,
) -> RelayState {
    let mut machine = RelayMachine::new();

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(status.as_u16(), &body);
        tracing::error!(status = %status, message = %message, "OpenRouter rejected streaming request");
        machine.mark_failed();
        let _ = tx
            .send(SseFrame::Event(StreamEvent::Error {
                message,
                status_code: status.as_u16(),
            }))
            .await;
        return machine.state();
    }

    machine.start_relaying();
    let mut stream = response.bytes_stream();

    loop {
        // Chunk receipt is the liveness clock: any upstream bytes
        // (comments included) reset the keep-alive timer.
        let next = tokio::time::timeout(KEEP_ALIVE_INTERVAL, stream.next()).await;
        match next {
            // No frame forwarded within the interval: nudge intermediaries.
            Err(_) => {
                if tx.send(SseFrame::KeepAlive).await.is_err() {
                    machine.mark_aborted();
                    return machine.state();
                }
            }
            Ok(Some(Ok(bytes))) => {
                for frame in machine.push_chunk(&bytes) {
                    let done = matches!(frame, RelayFrame::Done { .. });
                    let event = finalize_frame(frame, &requested_model, &cost_engine).await;
                    if tx.send(SseFrame::Event(event)).await.is_err() {
                        machine.mark_aborted();
                        return machine.state();
                    }
                    if done {
                        return machine.state();
                    }
                }
            }
            Ok(Some(Err(e))) => {
                tracing::error!(error = %e, "Error reading OpenRouter stream");
                machine.mark_failed();
                let status_code = if e.is_timeout() { 504 } else { 502 };
                let _ = tx
                    .send(SseFrame::Event(StreamEvent::Error {
                        message: format!("Error reading OpenRouter stream: {}", e),
                        status_code,
                    }))
                    .await;
                return machine.state();
            }
            Ok(None) => {
                // Upstream closed. A trailing unterminated [DONE] still counts.
                if let Some(frame) = machine.finish() {
                    let done = matches!(frame, RelayFrame::Done { .. });
                    let event = finalize_frame(frame, &requested_model, &cost_engine).await;
                    let _ = tx.send(SseFrame::Event(event)).await;
                    if done {
                        return machine.state();
                    }
                }
                tracing::warn!("OpenRouter stream ended without [DONE]");
                machine.mark_failed();
                return machine.state();
            }
        }
    }
}

/// Turn a machine frame into the outward event, computing the cost from
/// real usage at the end of the stream.
async fn finalize_frame(
    frame: RelayFrame,
    requested_model: &str,
    cost_engine: &CostEngine,
) -> StreamEvent {
    match frame {
        RelayFrame::Token(text) => StreamEvent::Token { text },
        RelayFrame::Done {
            model,
            finish_reason,
            usage,
        } => {
            let model = model.unwrap_or_else(|| requested_model.to_string());
            let cost = match &usage {
                Some(usage) => cost_engine
                    .cost(usage, &model)
                    .await
                    .map(|breakdown| CostSummary::new(breakdown.total_cost_rub, usage)),
                None => None,
            };
            if let (Some(cost), Some(usage)) = (&cost, &usage) {
                tracing::info!(
                    model = %model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    total_cost_rub = cost.total_cost_rub,
                    "Streaming request cost"
                );
            }
            StreamEvent::Done {
                model,
                finish_reason,
                cost,
            }
        }
    }
}
