//! Proxy error type.
//!
//! Every handler returns `Result<T, ProxyError>`; [`ProxyError`] implements
//! [`axum::response::IntoResponse`] so each failure leaves the proxy as a
//! `{success: false, error, details?}` body with a matching status code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::types::{ErrorBody, MAX_PROMPT_CHARS};
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Body is not a JSON object.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// `prompt`/`messages` absent or of the wrong shape.
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("prompt is empty")]
    EmptyInput,

    #[error("prompt is {0} characters long")]
    TooLong(usize),

    /// A generation parameter is outside its accepted range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The inference server answered with a non-success status.
    #[error("inference server returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("inference server unreachable at {url}")]
    Unavailable { url: String, detail: String },

    #[error("inference server at {url} timed out")]
    Timeout { url: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Classify an upstream failure, naming `url` in the operator hint.
    pub fn from_upstream(err: UpstreamError, url: &str) -> Self {
        match err {
            UpstreamError::Status { status, body } => {
                let mut message = upstream_error_text(&body);
                if message.is_empty() {
                    message = format!("Inference server returned HTTP {status}");
                }
                ProxyError::Upstream { status, message }
            }
            UpstreamError::Timeout => ProxyError::Timeout {
                url: url.to_owned(),
            },
            UpstreamError::Unreachable(detail) => ProxyError::Unavailable {
                url: url.to_owned(),
                detail,
            },
            other => ProxyError::Internal(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Malformed(_)
            | ProxyError::MissingField(_)
            | ProxyError::EmptyInput
            | ProxyError::TooLong(_)
            | ProxyError::OutOfRange(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            ProxyError::Malformed(m) => ("Malformed request body".to_owned(), Some(m.clone())),
            ProxyError::MissingField(m) => (format!("Missing or invalid field: {m}"), None),
            ProxyError::EmptyInput => ("Prompt is empty".to_owned(), None),
            ProxyError::TooLong(len) => (
                format!("Prompt is too long (max {MAX_PROMPT_CHARS} characters)"),
                Some(format!("received {len} characters")),
            ),
            ProxyError::OutOfRange(m) => (m.clone(), None),
            ProxyError::Upstream { status, message } => (
                message.clone(),
                Some(format!("inference server responded with HTTP {status}")),
            ),
            ProxyError::Unavailable { url, detail } => (
                format!("Inference server unavailable at {url}"),
                Some(format!(
                    "Check that the inference server is running and INFERENCE_SERVER_URL is correct ({detail})"
                )),
            ),
            ProxyError::Timeout { url } => (
                format!("Inference server at {url} did not respond in time"),
                Some("The model may still be loading or the prompt is too large".to_owned()),
            ),
            ProxyError::Internal(m) => ("Internal server error".to_owned(), Some(m.clone())),
        };
        ErrorBody {
            success: false,
            error,
            details,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "chat request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "chat request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

/// Pull the `error` string out of an upstream JSON body, or keep the raw text.
fn upstream_error_text(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
