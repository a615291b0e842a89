//! End-to-end tests for the proxy routes against a fake inference server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;

use codechat::config::Config;
use codechat::proxy::{self, AppState};
use codechat::upstream::InferenceClient;

// ============================================
// Fake inference server
// ============================================

#[derive(Clone)]
struct FakeInference {
    calls: Arc<AtomicUsize>,
    last_payload: Arc<Mutex<Option<Value>>>,
    last_auth: Arc<Mutex<Option<String>>>,
    status: StatusCode,
    body: Value,
    delay: Duration,
}

impl FakeInference {
    fn answering(status: StatusCode, body: Value) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            last_payload: Arc::new(Mutex::new(None)),
            last_auth: Arc::new(Mutex::new(None)),
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    fn ok() -> Self {
        Self::answering(
            StatusCode::OK,
            json!({
                "success": true,
                "code": "def reverse(s):\n    return s[::-1]",
                "tokens_generated": 12,
                "inference_time_ms": 845.3,
                "model_loaded": true,
                "gpu_memory": { "allocated_gb": 5.4, "reserved_gb": 6.1 }
            }),
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_payload(&self) -> Value {
        self.last_payload.lock().unwrap().clone().unwrap_or(Value::Null)
    }
}

async fn fake_generate(
    State(fake): State<FakeInference>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.calls.fetch_add(1, Ordering::SeqCst);
    *fake.last_payload.lock().unwrap() = Some(payload);
    *fake.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    tokio::time::sleep(fake.delay).await;
    (fake.status, Json(fake.body.clone()))
}

async fn fake_health() -> Json<Value> {
    Json(json!({ "status": "online", "model_loaded": true, "device": "cuda" }))
}

async fn fake_stats() -> Json<Value> {
    Json(json!({ "model_loaded": true, "cpu_usage_percent": 12.5 }))
}

async fn spawn_fake(fake: FakeInference) -> String {
    let app = Router::new()
        .route("/generate", post(fake_generate))
        .route("/health", get(fake_health))
        .route("/stats", get(fake_stats))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================
// Helpers
// ============================================

fn proxy_for(url: &str, extra: &[(&str, &str)]) -> Router {
    let url = url.to_string();
    let extra: Vec<(String, String)> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let cfg = Config::from_lookup(|key| {
        if key == "INFERENCE_SERVER_URL" {
            return Some(url.clone());
        }
        extra.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    });
    let client = InferenceClient::new(&cfg).unwrap();
    proxy::router(Arc::new(AppState::new(cfg, Arc::new(client))))
}

async fn call(app: Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_chat(app: Router, body: Value) -> (StatusCode, Value) {
    call(app, "POST", "/chat", Some(body.to_string())).await
}

// ============================================
// /chat
// ============================================

#[tokio::test]
async fn valid_prompt_is_relayed_with_defaults() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    let (status, body) = post_chat(
        proxy_for(&url, &[]),
        json!({ "prompt": "Write a function that reverses a string" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], "def reverse(s):\n    return s[::-1]");
    assert_eq!(body["tokens_generated"], 12);
    assert_eq!(body["inference_time_ms"], 845.3);
    assert_eq!(body["gpu_memory"]["allocated_gb"], 5.4);
    assert_eq!(fake.calls(), 1);

    let sent = fake.last_payload();
    assert_eq!(sent["prompt"], "Write a function that reverses a string");
    assert_eq!(sent["max_tokens"], 512);
    assert_eq!(sent["temperature"], 0.7);
}

#[tokio::test]
async fn invalid_requests_never_reach_upstream() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    let cases = [
        json!({ "prompt": "" }),
        json!({ "prompt": "   " }),
        json!({ "prompt": "a".repeat(2001) }),
        json!({ "prompt": "ok", "temperature": 1.01 }),
        json!({ "prompt": "ok", "temperature": -0.5 }),
        json!({ "prompt": "ok", "max_tokens": 0 }),
        json!({ "max_tokens": 10 }),
        json!({ "messages": [{ "role": "user" }] }),
    ];
    for case in cases {
        let (status, body) = post_chat(proxy_for(&url, &[]), case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {case}");
        assert_eq!(body["success"], false, "case {case}");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    let (status, body) = call(
        proxy_for(&url, &[]),
        "POST",
        "/chat",
        Some("{not json".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn specific_rejection_messages() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    let (_, empty) = post_chat(proxy_for(&url, &[]), json!({ "prompt": "   " })).await;
    assert_eq!(empty["error"], "Prompt is empty");

    let (_, long) = post_chat(proxy_for(&url, &[]), json!({ "prompt": "x".repeat(2001) })).await;
    assert!(long["error"].as_str().unwrap().contains("too long"));

    let (_, hot) = post_chat(
        proxy_for(&url, &[]),
        json!({ "prompt": "x", "temperature": 2 }),
    )
    .await;
    assert!(hot["error"].as_str().unwrap().contains("temperature"));

    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn boundary_values_are_accepted() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    for case in [
        json!({ "prompt": "a".repeat(2000) }),
        json!({ "prompt": "x", "temperature": 0 }),
        json!({ "prompt": "x", "temperature": 1 }),
    ] {
        let (status, _) = post_chat(proxy_for(&url, &[]), case).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(fake.calls(), 3);
}

#[tokio::test]
async fn history_is_forwarded_with_last_user_turn_as_prompt() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    let (status, _) = post_chat(
        proxy_for(&url, &[]),
        json!({
            "messages": [
                { "role": "user", "content": "write fizzbuzz" },
                { "role": "assistant", "content": "```python\nprint(1)\n```" },
                { "role": "user", "content": "now in rust" }
            ],
            "max_tokens": 256,
            "temperature": 0.2
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sent = fake.last_payload();
    assert_eq!(sent["prompt"], "now in rust");
    assert_eq!(sent["messages"].as_array().map(Vec::len), Some(3));
    assert_eq!(sent["max_tokens"], 256);
    assert_eq!(sent["temperature"], 0.2);
}

#[tokio::test]
async fn upstream_error_status_is_relayed() {
    let fake = FakeInference::answering(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "success": false, "error": "CUDA out of memory", "code": "" }),
    );
    let url = spawn_fake(fake.clone()).await;

    let (status, body) = post_chat(proxy_for(&url, &[]), json!({ "prompt": "hi" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "CUDA out of memory");
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn upstream_client_error_status_is_relayed() {
    let fake = FakeInference::answering(
        StatusCode::BAD_REQUEST,
        json!({ "error": "Prompt muito longo (máx 2000 chars)" }),
    );
    let url = spawn_fake(fake).await;

    let (status, body) = post_chat(proxy_for(&url, &[]), json!({ "prompt": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Prompt muito longo (máx 2000 chars)");
}

#[tokio::test]
async fn connection_failure_is_service_unavailable() {
    let (status, body) = post_chat(
        proxy_for("http://127.0.0.1:1", &[]),
        json!({ "prompt": "hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("http://127.0.0.1:1"));
}

#[tokio::test]
async fn slow_upstream_times_out_with_gateway_timeout() {
    let mut fake = FakeInference::ok();
    fake.delay = Duration::from_secs(5);
    let url = spawn_fake(fake).await;

    let started = std::time::Instant::now();
    let (status, body) = post_chat(
        proxy_for(&url, &[("CODECHAT_REQUEST_TIMEOUT_SECS", "1")]),
        json!({ "prompt": "hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains(&url));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let fake = FakeInference::ok();
    let url = spawn_fake(fake.clone()).await;

    post_chat(
        proxy_for(&url, &[("INFERENCE_API_KEY", "dev-key")]),
        json!({ "prompt": "hi" }),
    )
    .await;

    assert_eq!(
        fake.last_auth.lock().unwrap().as_deref(),
        Some("Bearer dev-key")
    );
}

// ============================================
// /health and /stats
// ============================================

#[tokio::test]
async fn health_reports_online_upstream() {
    let url = spawn_fake(FakeInference::ok()).await;
    let (status, body) = call(proxy_for(&url, &[]), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(body["upstream"]["status"], "online");
    assert_eq!(body["upstream"]["details"]["device"], "cuda");
}

#[tokio::test]
async fn health_survives_offline_upstream() {
    let (status, body) = call(proxy_for("http://127.0.0.1:1", &[]), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(body["upstream"]["status"], "offline");
    assert_eq!(body["upstream"]["url"], "http://127.0.0.1:1");
}

#[tokio::test]
async fn stats_are_relayed() {
    let url = spawn_fake(FakeInference::ok()).await;
    let (status, body) = call(proxy_for(&url, &[]), "GET", "/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu_usage_percent"], 12.5);
}

#[tokio::test]
async fn missing_upstream_route_is_relayed_as_not_found() {
    let url = spawn_fake(FakeInference::ok()).await;
    let (status, body) = call(proxy_for(&url, &[]), "POST", "/clear-cache", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

// ============================================
// Conversation → ProxyClient → proxy → inference server
// ============================================

async fn serve_proxy(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn conversation_round_trip_through_running_proxy() {
    use codechat::{Conversation, Phase, ProxyClient};

    let fake = FakeInference::ok();
    let inference_url = spawn_fake(fake.clone()).await;
    let proxy_url = serve_proxy(proxy_for(&inference_url, &[])).await;
    let client = ProxyClient::new(&proxy_url).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.upstream.status, "online");

    let mut convo = Conversation::new();
    convo.set_input("Write a function that reverses a string");
    let last = convo.send(&client).await.unwrap().clone();

    assert_eq!(last.content, "def reverse(s):\n    return s[::-1]");
    assert_eq!(last.inference_time_ms, Some(845.3));
    assert_eq!(convo.phase(), Phase::Idle);
    assert_eq!(fake.last_payload()["messages"][0]["role"], "user");
}

#[tokio::test]
async fn conversation_surfaces_proxy_errors() {
    use codechat::{Conversation, ProxyClient};

    let proxy_url = serve_proxy(proxy_for("http://127.0.0.1:1", &[])).await;
    let client = ProxyClient::new(&proxy_url).unwrap();

    let mut convo = Conversation::new();
    convo.set_input("hi");
    let last = convo.send(&client).await.unwrap().clone();

    assert!(last.content.starts_with("Error: Inference server unavailable"));
    assert!(convo.banner().unwrap().contains("http://127.0.0.1:1"));
    assert!(convo.pending().is_none());
}
