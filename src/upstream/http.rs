use super::{InferenceBackend, UpstreamError, UpstreamHealth};
use crate::config::Config;
use crate::types::{GenerateRequest, GenerationResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// HTTP client for the inference server's `/generate`, `/health`, `/stats`
/// and `/clear-cache` routes.
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    health_timeout: Duration,
}

impl InferenceClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.inference_url.clone(),
            api_key: config.api_key.clone(),
            health_timeout: config.health_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Read the body, turning non-success statuses into [`UpstreamError::Status`].
    async fn read_body(response: Response) -> Result<String, UpstreamError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, UpstreamError> {
        let start = Instant::now();
        let response = self
            .authorize(self.client.post(self.url("/generate")).json(request))
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        let result: GenerationResult = serde_json::from_str(&body)?;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            tokens = result.tokens_generated,
            "inference server answered"
        );
        Ok(result)
    }

    async fn health(&self) -> UpstreamHealth {
        let start = Instant::now();
        let request = self
            .authorize(self.client.get(self.url("/health")))
            .timeout(self.health_timeout);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let latency = start.elapsed().as_millis() as u64;
                let details = response.json::<serde_json::Value>().await.ok();
                UpstreamHealth {
                    url: self.base_url.clone(),
                    status: "online",
                    latency_ms: Some(latency),
                    details,
                }
            }
            Ok(response) => {
                UpstreamHealth::offline(&self.base_url, format!("HTTP {}", response.status()))
            }
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "inference server probe failed");
                UpstreamHealth::offline(&self.base_url, e.to_string())
            }
        }
    }

    async fn stats(&self) -> Result<serde_json::Value, UpstreamError> {
        let response = self
            .authorize(self.client.get(self.url("/stats")))
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn clear_cache(&self) -> Result<serde_json::Value, UpstreamError> {
        let response = self
            .authorize(self.client.post(self.url("/clear-cache")))
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
