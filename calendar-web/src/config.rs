// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

/// Configuration loaded from environment variables.
///
/// All configuration is externalized to support 12-factor app deployment.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 8081)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Keycloak realm URL used to derive the OAuth2 endpoints
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    /// OAuth2 client id registered with the realm
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth2 client secret
    #[serde(default = "default_client_secret")]
    pub client_secret: String,

    /// Redirect URI registered with the realm
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Base URL of the protected backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Failure rate (0.0..=1.0) at which the circuit breaker opens
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Rolling outcome window size for the circuit breaker
    #[serde(default = "default_breaker_window_size")]
    pub breaker_window_size: usize,

    /// Seconds an open breaker waits before admitting trial calls
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,

    /// Trial calls admitted while half-open
    #[serde(default = "default_breaker_half_open_trials")]
    pub breaker_half_open_trials: u32,

    /// Total attempts per backend call, including the first
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Fixed delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Concurrent backend calls admitted by the bulkhead
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty" (default: json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_issuer_url() -> String {
    "http://localhost:8080/realms/demo".to_string()
}

fn default_client_id() -> String {
    "frontend-app".to_string()
}

fn default_client_secret() -> String {
    "frontend-secret".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:8081/login/oauth2/code/keycloak".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_breaker_window_size() -> usize {
    10
}

fn default_breaker_cooldown() -> u64 {
    30
}

fn default_breaker_half_open_trials() -> u32 {
    3
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

fn default_call_timeout() -> u64 {
    10
}

fn default_max_concurrent_calls() -> usize {
    25
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are uppercase with underscore separators.
    /// Example: `ISSUER_URL`, `CLIENT_SECRET`, `BACKEND_URL`, etc.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// The realm's authorization endpoint.
    pub fn authorization_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/auth",
            self.issuer_url.trim_end_matches('/')
        )
    }

    /// The realm's token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/token",
            self.issuer_url.trim_end_matches('/')
        )
    }
}
