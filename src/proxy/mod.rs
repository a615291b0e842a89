//! HTTP surface of the proxy: `/chat`, `/health`, `/stats`, `/clear-cache`.

pub mod validate;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::ProxyError;
use crate::types::ChatResponse;
use crate::upstream::{InferenceBackend, UpstreamHealth};

/// Shared state handed to every handler. Immutable after startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn InferenceBackend>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub upstream: UpstreamHealth,
}

/// Build the proxy router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/clear-cache", post(clear_cache))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    match config.cors_allowed_origins.as_deref() {
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            if origins.is_empty() {
                layer.allow_origin(Any)
            } else {
                layer.allow_origin(origins)
            }
        }
        // Wildcard for development; set CODECHAT_CORS_ORIGINS in production.
        None => layer.allow_origin(Any),
    }
}

/// Validate, relay to `/generate`, map the outcome.
///
/// The body is taken as raw bytes so that malformed JSON is answered with the
/// proxy's own error body rather than the extractor's plain-text rejection.
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ProxyError> {
    let request = validate::normalize(&body)?;
    let upstream = state.backend.base_url();

    info!(
        prompt_chars = request.prompt.chars().count(),
        history = request.messages.as_ref().map_or(0, Vec::len),
        max_tokens = request.max_tokens,
        temperature = request.temperature,
        "relaying chat request"
    );

    let result = timeout(state.config.request_timeout, state.backend.generate(&request))
        .await
        .map_err(|_| ProxyError::Timeout {
            url: upstream.to_owned(),
        })?
        .map_err(|e| ProxyError::from_upstream(e, upstream))?;

    if !result.success {
        return Err(ProxyError::Upstream {
            status: 500,
            message: result
                .error
                .unwrap_or_else(|| "generation failed".to_owned()),
        });
    }

    info!(
        tokens = result.tokens_generated,
        inference_time_ms = result.inference_time_ms,
        "chat request completed"
    );
    Ok(Json(result.into()))
}

/// Local liveness plus a best-effort probe of the inference server.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend = &state.backend;
    let upstream = timeout(state.config.health_timeout, backend.health())
        .await
        .unwrap_or_else(|_| UpstreamHealth::offline(backend.base_url(), "probe timed out"));

    Json(HealthResponse {
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        upstream,
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ProxyError> {
    relay(&state, state.backend.stats()).await
}

async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let snapshot = relay(&state, state.backend.clear_cache()).await?;
    info!("inference server cache cleared");
    Ok(snapshot)
}

async fn relay<F>(state: &AppState, call: F) -> Result<Json<serde_json::Value>, ProxyError>
where
    F: std::future::Future<Output = Result<serde_json::Value, crate::upstream::UpstreamError>>,
{
    let url = state.backend.base_url();
    timeout(state.config.request_timeout, call)
        .await
        .map_err(|_| ProxyError::Timeout { url: url.to_owned() })?
        .map(Json)
        .map_err(|e| ProxyError::from_upstream(e, url))
}
