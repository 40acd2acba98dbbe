//! Integration tests for the streaming relay.
//!
//! Feeds the relay a canned SSE body from wiremock and checks the event
//! sequence, the final cost, error classification, and abort behavior.

use std::sync::Arc;

use axum::body::Body;
use http::Request;
use tokio::sync::mpsc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kopek::config::Config;
use kopek::pricing::{CostEngine, PricingResolver};
use kopek::proxy::{create_router, run_relay, AppState, RelayState, SseFrame, StreamEvent};

const SSE_BODY: &str = concat!(
    "data: {\"model\":\"openai/gpt-4o\",\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
    "data: [DONE]\n\n",
);

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "openai/gpt-4o",
                "canonical_slug": "openai/gpt-4o",
                "pricing": {"prompt": "0.001", "completion": "0.002", "request": "0"}
            }]
        })))
        .mount(server)
        .await;
}

fn cost_engine(server: &MockServer) -> Arc<CostEngine> {
    let resolver = PricingResolver::new(
        reqwest::Client::new(),
        format!("{}/api/v1/models", server.uri()),
    );
    Arc::new(CostEngine::new(resolver, 110.0))
}

async fn open_stream(server: &MockServer) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}/api/v1/chat/completions", server.uri()))
        .send()
        .await
        .expect("open stream")
}

#[tokio::test]
async fn relay_forwards_tokens_then_done_with_cost() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let response = open_stream(&server).await;
    let (tx, mut rx) = mpsc::channel(32);

    let state = run_relay(response, "requested/model".to_string(), cost_engine(&server), tx).await;
    assert_eq!(state, RelayState::Done);

    let mut events = Vec::new();
    while let Some(frame) = rx.recv().await {
        if let SseFrame::Event(event) = frame {
            events.push(event);
        }
    }

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        StreamEvent::Token {
            text: "Hello".to_string()
        }
    );
    assert_eq!(
        events[1],
        StreamEvent::Token {
            text: " world".to_string()
        }
    );
    match &events[2] {
        StreamEvent::Done {
            model,
            finish_reason,
            cost,
        } => {
            assert_eq!(model, "openai/gpt-4o");
            assert_eq!(finish_reason.as_deref(), Some("stop"));
            let cost = cost.expect("cost should be present");
            assert_eq!(cost.prompt_tokens, 5);
            assert_eq!(cost.completion_tokens, 2);
            assert_eq!(cost.total_tokens, 7);
            // prompt: 5 * 0.001 * 110 = 0.55, completion: 2 * 0.002 * 110 = 0.44
            assert_eq!(cost.total_cost_rub, 0.99);
        }
        other => panic!("expected Done, got {:?}", other),
    }
}

#[tokio::test]
async fn usage_without_done_sentinel_yields_no_final_event() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":\"stop\"}]}\n\n";
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let response = open_stream(&server).await;
    let (tx, mut rx) = mpsc::channel(32);

    let state = run_relay(response, "m".to_string(), cost_engine(&server), tx).await;
    assert_eq!(state, RelayState::Failed);

    let mut events = Vec::new();
    while let Some(frame) = rx.recv().await {
        events.push(frame);
    }
    assert_eq!(
        events,
        vec![SseFrame::Event(StreamEvent::Token {
            text: "Hi".to_string()
        })]
    );
}

#[tokio::test]
async fn initial_rejection_emits_single_error_and_never_relays() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"message": "Rate limit exceeded", "code": 429}
        })))
        .mount(&server)
        .await;

    let response = open_stream(&server).await;
    let (tx, mut rx) = mpsc::channel(32);

    let state = run_relay(response, "m".to_string(), cost_engine(&server), tx).await;
    assert_eq!(state, RelayState::Failed);

    let mut events = Vec::new();
    while let Some(frame) = rx.recv().await {
        events.push(frame);
    }
    assert_eq!(
        events,
        vec![SseFrame::Event(StreamEvent::Error {
            message: "Rate limit exceeded".to_string(),
            status_code: 429,
        })]
    );
}

#[tokio::test]
async fn downstream_disconnect_aborts_with_no_further_writes() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let response = open_stream(&server).await;
    let (tx, rx) = mpsc::channel(32);
    drop(rx); // client gone before the first token

    let state = run_relay(response, "m".to_string(), cost_engine(&server), tx).await;
    assert_eq!(state, RelayState::Aborted);
}

#[tokio::test]
async fn streaming_endpoint_emits_sse_frames_end_to_end() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let config = Config::parse_str(&format!(
        r#"
        [upstream]
        chat_url = "{uri}/api/v1/chat/completions"
        models_url = "{uri}/api/v1/models"
        api_key = "sk-test"
        "#,
        uri = server.uri()
    ))
    .unwrap();
    let app = create_router(AppState::from_config(config).unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat/stream")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "message": "hi",
                        "model": "openai/gpt-4o"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    let frames: Vec<&str> = text
        .split("\n\n")
        .filter(|f| f.starts_with("data: "))
        .collect();
    assert_eq!(frames.len(), 3, "frames: {:?}", frames);
    assert!(frames[0].contains(r#""token":"Hello""#));
    assert!(frames[1].contains(r#""token":" world""#));
    assert!(frames[2].contains(r#""done":true"#));
    assert!(frames[2].contains(r#""model":"openai/gpt-4o""#));
    assert!(frames[2].contains(r#""finish_reason":"stop""#));
    assert!(frames[2].contains(r#""total_cost_rub":0.99"#));
}
