use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::types::{ChatRequest, ChatResponse, ErrorBody};

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChatError(String);

impl ChatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::new("The proxy did not answer in time")
        } else if err.is_connect() {
            ChatError::new(format!("Could not reach the proxy: {err}"))
        } else {
            ChatError::new(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================
// Transport
// ============================================

/// A generated reply as the conversation sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub tokens_generated: u64,
    pub inference_time_ms: f64,
}

impl From<ChatResponse> for ChatReply {
    fn from(response: ChatResponse) -> Self {
        Self {
            text: response.code,
            tokens_generated: response.tokens_generated,
            inference_time_ms: response.inference_time_ms,
        }
    }
}

/// Carries one chat request to the proxy and back.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> ChatResult<ChatReply>;
}

/// Proxy status as reported by `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyHealth {
    pub status: String,
    pub version: String,
    pub upstream: UpstreamStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamStatus {
    pub url: String,
    pub status: String,
}

/// HTTP transport talking to a running proxy.
pub struct ProxyClient {
    client: Client,
    base_url: String,
}

/// Slightly above the proxy's own upstream bound so the proxy gets to answer
/// with a structured 504 first.
const PROXY_TIMEOUT: Duration = Duration::from_secs(50);

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> ChatResult<Self> {
        let client = Client::builder().timeout(PROXY_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> ChatResult<ProxyHealth> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatTransport for ProxyClient {
    async fn send(&self, request: &ChatRequest) -> ChatResult<ChatReply> {
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let parsed: ChatResponse = serde_json::from_str(&body)?;
            return Ok(parsed.into());
        }

        // Prefer the proxy's structured error; fall back to the raw body.
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => Err(ChatError::new(match err.details {
                Some(details) => format!("{} ({details})", err.error),
                None => err.error,
            })),
            Err(_) => Err(ChatError::new(format!("Proxy error {status}: {body}"))),
        }
    }
}
