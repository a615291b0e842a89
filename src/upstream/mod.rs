//! Inference server abstraction and its HTTP implementation.

mod http;

pub use http::InferenceClient;

use crate::types::{GenerateRequest, GenerationResult};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur when calling the inference server.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The server answered with a non-success status.
    #[error("inference server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference server did not answer in time")]
    Timeout,

    #[error("could not connect to inference server: {0}")]
    Unreachable(String),

    #[error("unexpected response from inference server: {0}")]
    Decode(String),

    #[error("inference request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_connect() {
            UpstreamError::Unreachable(err.to_string())
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Decode(err.to_string())
    }
}

/// Result of the best-effort liveness probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamHealth {
    pub url: String,
    /// `"online"` or `"offline"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Upstream `/health` body when it answered, error text otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl UpstreamHealth {
    pub fn offline(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: "offline",
            latency_ms: None,
            details: Some(serde_json::Value::String(reason.into())),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// Seam between the proxy routes and whatever actually generates text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Base address, used in operator-facing error hints.
    fn base_url(&self) -> &str;

    /// Run one generation.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, UpstreamError>;

    /// Probe liveness. Never fails; problems show up as `"offline"`.
    async fn health(&self) -> UpstreamHealth;

    /// Resource-usage snapshot from the inference server.
    async fn stats(&self) -> Result<serde_json::Value, UpstreamError>;

    /// Ask the inference server to release cached GPU memory.
    async fn clear_cache(&self) -> Result<serde_json::Value, UpstreamError>;
}
