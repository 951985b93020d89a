// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod config;
mod handlers;
mod oauth;
mod resilience;
mod session;

use client::BackendClient;
use config::Config;
use handlers::AppState;
use oauth::{LoginFlow, OAuthConfig};
use resilience::{BreakerConfig, Bulkhead, CircuitBreaker, RetryPolicy};
use session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_tracing(&config);

    tracing::info!(
        host = %config.host,
        port = config.port,
        issuer_url = %config.issuer_url,
        backend_url = %config.backend_url,
        "starting calendar-web"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.call_timeout_secs))
        .build()?;

    let login = LoginFlow::new(
        OAuthConfig {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorization_endpoint: reqwest::Url::parse(&config.authorization_endpoint())?,
            token_endpoint: config.token_endpoint(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: "openid profile email".to_string(),
        },
        http.clone(),
    );

    let backend = BackendClient::new(
        http,
        config.backend_url.clone(),
        Bulkhead::new(config.max_concurrent_calls),
        CircuitBreaker::new(BreakerConfig {
            window_size: config.breaker_window_size,
            failure_rate_threshold: config.failure_rate_threshold,
            cool_down: Duration::from_secs(config.breaker_cooldown_secs),
            half_open_trials: config.breaker_half_open_trials,
        }),
        RetryPolicy::new(
            config.retry_max_attempts,
            Duration::from_secs(config.retry_delay_secs),
        ),
        Duration::from_secs(config.call_timeout_secs),
    );

    let state = AppState {
        sessions: Arc::new(SessionStore::new()),
        login: Arc::new(login),
        backend: Arc::new(backend),
    };

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("calendar-web stopped");
    Ok(())
}

/// Initialize tracing based on configuration.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
