//! Proxy configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Runtime configuration for the proxy server.
///
/// Every field has a default so the proxy starts against a local inference
/// server without any environment set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"127.0.0.1:3000"`).
    pub bind_address: String,

    /// Base URL of the inference server, without a trailing slash.
    pub inference_url: String,

    /// Key attached to upstream calls. `None` runs in development mode.
    pub api_key: Option<String>,

    /// Upper bound on a `/generate` call.
    pub request_timeout: Duration,

    /// Upper bound on the upstream liveness probe.
    pub health_timeout: Duration,

    /// Comma-separated CORS origins; permissive when unset.
    pub cors_allowed_origins: Option<String>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// Emit log records as newline-delimited JSON.
    pub log_json: bool,
}

pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Build [`Config`] from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_owned())
        };
        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Self {
            bind_address: env_or("CODECHAT_BIND", "127.0.0.1:3000"),
            inference_url: env_or("INFERENCE_SERVER_URL", DEFAULT_INFERENCE_URL)
                .trim_end_matches('/')
                .to_owned(),
            api_key: lookup("INFERENCE_API_KEY").filter(|v| !v.trim().is_empty()),
            request_timeout: Duration::from_secs(secs(
                "CODECHAT_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            health_timeout: Duration::from_secs(secs(
                "CODECHAT_HEALTH_TIMEOUT_SECS",
                DEFAULT_HEALTH_TIMEOUT_SECS,
            )),
            cors_allowed_origins: lookup("CODECHAT_CORS_ORIGINS")
                .filter(|v| !v.trim().is_empty()),
            log_level: env_or("CODECHAT_LOG", "info"),
            log_json: lookup("CODECHAT_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
