//! HTTP proxy module.
//!
//! Accepts client chat requests, forwards them to OpenRouter, and
//! re-exposes the reply either buffered or as a live SSE token stream.

mod handlers;
pub mod messages;
pub mod relay;
mod server;
pub mod types;
pub mod upstream;

pub use relay::{run_relay, RelayFrame, RelayMachine, RelayState, SseFrame};
pub use server::{create_router, run_server, AppState};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role, StreamEvent};
