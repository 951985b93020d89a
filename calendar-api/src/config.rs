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

    /// Server port (default: 8082)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Expected token issuer (Keycloak realm URL)
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    /// JWKS endpoint publishing the realm's signing keys
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,

    /// JWKS cache TTL in seconds (default: 300)
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

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
    8082
}

fn default_issuer_url() -> String {
    "http://localhost:8080/realms/demo".to_string()
}

fn default_jwks_url() -> String {
    "http://localhost:8080/realms/demo/protocol/openid-connect/certs".to_string()
}

fn default_jwks_cache_ttl() -> u64 {
    300
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
    /// Example: `ISSUER_URL`, `JWKS_URL`, `LOG_LEVEL`, etc.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        std::env::remove_var("ISSUER_URL");
        std::env::remove_var("JWKS_URL");

        let config = Config::from_env().expect("Failed to load config");

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8082);
        assert_eq!(config.issuer_url, "http://localhost:8080/realms/demo");
        assert_eq!(config.jwks_cache_ttl_secs, 300);
    }
}
