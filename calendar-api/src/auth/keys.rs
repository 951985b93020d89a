// SPDX-License-Identifier: Apache-2.0
//! JWKS Key Source
//!
//! Fetches the identity provider's published signing keys and caches them
//! (moka cache, TTL-based invalidation). An unknown key id forces at most
//! one cache refresh per lookup so key rotation is picked up without a
//! refresh storm.

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to fetch JWKS: {0}")]
    Unreachable(String),

    #[error("Key not found for kid: {0}")]
    UnknownKid(String),

    #[error("Invalid key material: {0}")]
    BadKey(String),
}

/// Source of token-verification keys, keyed by `kid`.
///
/// The production implementation fetches from the provider's JWKS
/// endpoint; tests substitute a static key set.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, KeyError>;
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,

    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm (e.g., "RS256")
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signature)
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,

    /// RSA modulus
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Check if this is an RSA key.
    pub fn is_rsa(&self) -> bool {
        self.kty == "RSA"
    }

    /// Check if this key is used for signatures.
    pub fn is_signature_key(&self) -> bool {
        self.key_use.as_deref() == Some("sig") || self.key_use.is_none()
    }

    /// Convert to a jsonwebtoken DecodingKey.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, KeyError> {
        if !self.is_rsa() {
            return Err(KeyError::BadKey(format!(
                "Unsupported key type: {}",
                self.kty
            )));
        }

        let n = self
            .n
            .as_ref()
            .ok_or_else(|| KeyError::BadKey("Missing RSA modulus (n)".to_string()))?;
        let e = self
            .e
            .as_ref()
            .ok_or_else(|| KeyError::BadKey("Missing RSA exponent (e)".to_string()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| KeyError::BadKey(format!("Invalid RSA key: {}", e)))
    }
}

/// JWKS key source with caching.
pub struct JwksKeySource {
    client: Client,
    jwks_url: String,
    cache: Cache<String, Arc<Jwks>>,
}

impl JwksKeySource {
    pub fn new(jwks_url: String, cache_ttl: Duration, http_timeout: Duration) -> Result<Self, KeyError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| KeyError::Unreachable(e.to_string()))?;

        let cache = Cache::builder()
            .time_to_live(cache_ttl)
            .max_capacity(2)
            .build();

        Ok(Self {
            client,
            jwks_url,
            cache,
        })
    }

    /// Fetch JWKS, serving from cache unless `force` requests a refresh.
    async fn get_jwks(&self, force: bool) -> Result<Arc<Jwks>, KeyError> {
        if force {
            self.cache.invalidate(&self.jwks_url).await;
        } else if let Some(jwks) = self.cache.get(&self.jwks_url).await {
            debug!("JWKS cache hit");
            return Ok(jwks);
        }

        info!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = %status, "Failed to fetch JWKS");
            return Err(KeyError::Unreachable(format!("HTTP {}", status)));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| KeyError::Unreachable(e.to_string()))?;

        info!(key_count = jwks.keys.len(), "JWKS fetched and cached");

        let jwks = Arc::new(jwks);
        self.cache.insert(self.jwks_url.clone(), jwks.clone()).await;

        Ok(jwks)
    }

    fn find_key(jwks: &Jwks, kid: &str) -> Option<Jwk> {
        jwks.keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid) && k.is_signature_key())
            .cloned()
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        let jwks = self.get_jwks(false).await?;

        if let Some(jwk) = Self::find_key(&jwks, kid) {
            return jwk.to_decoding_key();
        }

        // Unknown kid may mean the provider rotated keys since the last
        // fetch. One forced refresh, then give up.
        debug!(kid = %kid, "Unknown kid, forcing JWKS refresh");
        let jwks = self.get_jwks(true).await?;

        Self::find_key(&jwks, kid)
            .ok_or_else(|| KeyError::UnknownKid(kid.to_string()))?
            .to_decoding_key()
    }
}
