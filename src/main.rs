//! codechat proxy server.
//!
//! Startup order:
//! 1. Load `.env`, then configuration from the environment.
//! 2. Initialise tracing.
//! 3. Build the inference client and the router.
//! 4. Serve until Ctrl-C / SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use codechat::config::Config;
use codechat::proxy::{self, AppState};
use codechat::upstream::InferenceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside development.
    let dotenv = dotenvy::dotenv();
    let cfg = Config::from_env();

    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "codechat proxy starting");
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    if cfg.api_key.is_none() {
        warn!("INFERENCE_API_KEY not set; calling the inference server without credentials");
    }

    let client = InferenceClient::new(&cfg).context("failed to create inference client")?;
    info!(
        inference_url = %cfg.inference_url,
        timeout_secs = cfg.request_timeout.as_secs(),
        "inference server configured"
    );

    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid CODECHAT_BIND address: {}", cfg.bind_address))?;

    let state = Arc::new(AppState::new(cfg, Arc::new(client)));
    let app = proxy::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("codechat proxy stopped");
    Ok(())
}

fn init_tracing(cfg: &Config) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CODECHAT_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
