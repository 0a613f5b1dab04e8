//! Integration tests for the conversational RAG server.
//!
//! The HTTP tests drive the full router (middleware included) with a mock
//! chat model. The live test needs a real model endpoint.
//! Run it with: cargo test --test integration -- --ignored

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use conversational_rag::api::{create_router, AppState};
use conversational_rag::chain::{self, ConversationalRagChain, Document, InMemoryRetriever};
use conversational_rag::config::{Config, APP_DESCRIPTION, APP_TITLE, APP_VERSION};
use conversational_rag::error::ChainError;
use conversational_rag::llm::mock::MockModelConfig;
use conversational_rag::llm::MockChatModel;
use conversational_rag::metrics::detached_handle;
use conversational_rag::runnable::{OutputStream, RouteOptions, Runnable, RunnableConfig};

/// Build the router the way `serve` does, from environment-style pairs.
fn app_with(pairs: &[(&str, &str)], model: MockChatModel) -> Router {
    let config = Config::from_pairs(pairs.iter().copied()).unwrap();
    config.validate().unwrap();

    let retriever = InMemoryRetriever::new();
    retriever.insert(Document::new(
        "gpu.txt",
        "The H100 GPU has 80 GB of memory.",
    ));
    retriever.insert(Document::new(
        "milvus.txt",
        "Milvus is a vector database.",
    ));

    let rag_chain = ConversationalRagChain::new(
        Arc::new(model),
        Arc::new(retriever),
        config.retriever_top_k,
    );

    create_router(
        AppState::new(config.proxy_prefix(), detached_handle()),
        Arc::new(rag_chain),
        RouteOptions::default().max_concurrency(config.max_concurrency),
    )
}

fn app(model: MockChatModel) -> Router {
    app_with(&[], model)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

/// `(event, data)` pairs of a server-sent events body.
fn sse_events(body: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(body)
        .split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| {
            let mut event = None;
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            event.map(|e| (e, data))
        })
        .collect()
}

// === Health and navigation ===

#[tokio::test]
async fn test_healthz_returns_success() {
    let (status, _, body) = send(app(MockChatModel::new("hi")), get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "success");
}

#[tokio::test]
async fn test_root_redirects_to_playground_without_prefix() {
    let (status, headers, _) = send(app(MockChatModel::new("hi")), get("/")).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/playground/");
}

#[tokio::test]
async fn test_root_redirects_under_proxy_prefix() {
    let app = app_with(&[("PROXY_PREFIX", "/api")], MockChatModel::new("hi"));
    let (status, headers, _) = send(app, get("/")).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/api/playground/");
}

#[tokio::test]
async fn test_routes_answer_with_and_without_prefix() {
    let app = app_with(&[("PROXY_PREFIX", "/api/")], MockChatModel::new("hi"));

    for uri in ["/healthz", "/api/healthz", "/playground/", "/api/playground/"] {
        let (status, _, _) = send(app.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (status, headers, _) = send(app.clone(), get("/api/")).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/api/playground/");

    let (status, _, body) = send(
        app.clone(),
        post_json("/api/invoke", json!({ "input": { "question": "hello" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], "hi");

    let (status, _, body) = send(app, get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({ "detail": "Not Found: /nope" }));
}

#[tokio::test]
async fn test_openapi_carries_fixed_metadata() {
    let app = app_with(&[("PROXY_PREFIX", "/api")], MockChatModel::new("hi"));
    let (status, _, body) = send(app, get("/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    let doc = json_body(&body);
    assert_eq!(doc["info"]["title"], APP_TITLE);
    assert_eq!(doc["info"]["version"], APP_VERSION);
    assert_eq!(doc["info"]["description"], APP_DESCRIPTION);
    assert_eq!(doc["info"]["title"], "NVIDIA Conversational RAG");
    assert_eq!(doc["servers"][0]["url"], "/api");
}

#[tokio::test]
async fn test_metrics_endpoint_is_served() {
    let (status, headers, _) = send(app(MockChatModel::new("hi")), get("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

// === Chain endpoints ===

#[tokio::test]
async fn test_invoke_returns_output_and_run_id() {
    let model = MockChatModel::new("It has 80 GB.");
    let app = app(model.clone());

    let (status, _, body) = send(
        app,
        post_json("/invoke", json!({ "input": { "question": "How much memory does the H100 GPU have?" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["output"], "It has 80 GB.");
    assert!(body["metadata"]["run_id"].as_str().is_some());

    // No history: a single model call whose system prompt carries the context.
    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][0].content.contains("80 GB of memory"));
}

#[tokio::test]
async fn test_invoke_with_history_condenses_first() {
    let model = MockChatModel::new("final answer").with_script(["What is Milvus?"]);
    let app = app(model.clone());

    let input = json!({
        "input": {
            "question": "What is it?",
            "chat_history": [
                { "role": "human", "content": "Tell me about Milvus" },
                { "role": "ai", "content": "Sure." }
            ]
        }
    });
    let (status, _, body) = send(app, post_json("/invoke", input)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], "final answer");

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1][0].content.contains("vector database"));
    assert_eq!(calls[1].last().unwrap().content, "What is it?");
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let model = MockChatModel::new("default").with_script(["one", "two", "three"]);
    let app = app(model);

    let inputs = json!({
        "inputs": [
            { "question": "first" },
            { "question": "second" },
            { "question": "third" }
        ],
        "config": { "max_concurrency": 1 }
    });
    let (status, _, body) = send(app, post_json("/batch", inputs)).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["output"], json!(["one", "two", "three"]));
    assert_eq!(body["metadata"]["run_ids"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_stream_emits_metadata_data_and_end() {
    let app = app(MockChatModel::new("Hello streaming world"));

    let (status, headers, body) = send(
        app,
        post_json("/stream", json!({ "input": { "question": "Say hello" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = sse_events(&body);
    assert_eq!(events.first().unwrap().0, "metadata");
    assert_eq!(events.last().unwrap().0, "end");

    let text: String = events
        .iter()
        .filter(|(event, _)| event == "data")
        .map(|(_, data)| serde_json::from_str::<String>(data).unwrap())
        .collect();
    assert_eq!(text, "Hello streaming world");
}

#[tokio::test]
async fn test_schema_endpoints() {
    let app = app(MockChatModel::new("hi"));

    let (status, _, body) = send(app.clone(), get("/input_schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["required"], json!(["question"]));

    let (status, _, body) = send(app.clone(), get("/output_schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["type"], "string");

    let (status, _, body) = send(app, get("/config_schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json_body(&body)["properties"]["max_concurrency"].is_object());
}

#[tokio::test]
async fn test_playground_page_names_chain() {
    let (status, headers, body) =
        send(app(MockChatModel::new("hi")), get("/playground/")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(String::from_utf8(body)
        .unwrap()
        .contains(chain::CHAIN_NAME));
}

// === Error handling ===

/// Runnable with scripted failures.
///
/// `invoke` panics on `"panic"`, fails on `"fail"`, and echoes anything else.
/// `stream` yields one chunk and then fails.
struct Faulty;

#[async_trait]
impl Runnable for Faulty {
    fn name(&self) -> &str {
        "Faulty"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "string" })
    }

    fn output_schema(&self) -> Value {
        json!({ "type": "string" })
    }

    async fn invoke(&self, input: Value, _config: &RunnableConfig) -> Result<Value, ChainError> {
        match input.as_str() {
            Some("panic") => panic!("runnable blew up"),
            Some("fail") => Err(ChainError::Serialization(
                serde_json::from_str::<Value>("{").unwrap_err(),
            )),
            _ => Ok(input),
        }
    }

    async fn stream(&self, _input: Value, _config: &RunnableConfig) -> Result<OutputStream, ChainError> {
        let chunks: Vec<Result<Value, ChainError>> = vec![
            Ok(json!("a")),
            Err(ChainError::Serialization(
                serde_json::from_str::<Value>("{").unwrap_err(),
            )),
            Ok(json!("never sent")),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn faulty_app() -> Router {
    create_router(
        AppState::new("", detached_handle()),
        Arc::new(Faulty),
        RouteOptions::default(),
    )
}

#[tokio::test]
async fn test_stream_failure_is_reported_in_band_and_ends_stream() {
    let (status, _, body) = send(faulty_app(), post_json("/stream", json!({ "input": "x" }))).await;

    // Headers were already sent, so the status stays 200.
    assert_eq!(status, StatusCode::OK);

    let events = sse_events(&body);
    let names: Vec<&str> = events.iter().map(|(event, _)| event.as_str()).collect();
    assert_eq!(names, vec!["metadata", "data", "error"]);

    assert_eq!(events[1].1, "\"a\"");
    let error: Value = serde_json::from_str(&events[2].1).unwrap();
    assert_eq!(
        error,
        json!({ "status_code": 500, "message": "Internal Server Error" })
    );
}

#[tokio::test]
async fn test_handler_panic_becomes_json_500() {
    let (status, headers, body) =
        send(faulty_app(), post_json("/invoke", json!({ "input": "panic" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(json_body(&body), json!({ "detail": "Internal Server Error" }));

    // The server keeps serving after a panic.
    let (status, _, _) = send(faulty_app(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_one_failing_input_fails_whole_batch() {
    let (status, _, body) = send(
        faulty_app(),
        post_json("/batch", json!({ "inputs": ["ok", "fail", "ok"] })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "detail": "Internal Server Error" }));

    let (status, _, body) = send(
        faulty_app(),
        post_json("/batch", json!({ "inputs": ["ok", "also ok"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], json!(["ok", "also ok"]));
}

#[tokio::test]
async fn test_blank_question_in_batch_is_unprocessable() {
    let inputs = json!({
        "inputs": [
            { "question": "fine" },
            { "question": "" }
        ]
    });
    let (status, _, body) = send(app(MockChatModel::new("hi")), post_json("/batch", inputs)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json_body(&body)["detail"].as_str().is_some());
}

#[tokio::test]
async fn test_blank_question_is_unprocessable() {
    let (status, headers, body) = send(
        app(MockChatModel::new("hi")),
        post_json("/invoke", json!({ "input": { "question": "   " } })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert!(json_body(&body)["detail"].as_str().is_some());
}

#[tokio::test]
async fn test_model_failure_hides_details() {
    let (status, _, body) = send(
        app(MockChatModel::failing()),
        post_json("/invoke", json!({ "input": { "question": "anything" } })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "detail": "Internal Server Error" }));
}

#[tokio::test]
async fn test_rate_limited_model_is_unavailable() {
    let model = MockChatModel::with_config(MockModelConfig {
        rate_limited: true,
        ..MockModelConfig::default()
    });
    let (status, _, body) = send(
        app(model),
        post_json("/invoke", json!({ "input": { "question": "anything" } })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json_body(&body)["detail"].as_str().is_some());
}

#[tokio::test]
async fn test_unknown_path_is_json_not_found() {
    let (status, headers, body) =
        send(app(MockChatModel::new("hi")), get("/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        json_body(&body),
        json!({ "detail": "Not Found: /does-not-exist" })
    );
}

#[tokio::test]
async fn test_malformed_body_is_rewritten_as_json() {
    let request = Request::builder()
        .method("POST")
        .uri("/invoke")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, headers, body) = send(app(MockChatModel::new("hi")), request).await;

    assert!(status.is_client_error());
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert!(!json_body(&body)["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_method_is_json() {
    let (status, headers, _) = send(app(MockChatModel::new("hi")), get("/invoke")).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
}

// === Live endpoint ===

/// Get a live config from environment.
fn live_config() -> Option<Config> {
    dotenvy::dotenv().ok();

    let api_key = std::env::var("NVIDIA_API_KEY").ok()?;
    if api_key.is_empty() {
        return None;
    }

    Config::load().ok()
}

/// Ask the configured model endpoint a real question.
#[tokio::test]
#[ignore = "requires NVIDIA_API_KEY"]
async fn test_live_invoke() {
    let config = match live_config() {
        Some(c) => c,
        None => {
            println!("Skipping: NVIDIA_API_KEY not set");
            return;
        }
    };

    let rag_chain = chain::from_config(&config).await.unwrap();
    let answer = rag_chain
        .invoke(
            json!({ "question": "Reply with the single word: ready" }),
            &RunnableConfig::default(),
        )
        .await
        .unwrap();

    println!("Answer: {}", answer);
    assert!(answer.as_str().is_some_and(|a| !a.is_empty()));
}
