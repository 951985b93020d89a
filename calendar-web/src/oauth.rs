// SPDX-License-Identifier: Apache-2.0
//! Login Flow Orchestrator
//!
//! Drives the authorization-code flow against Keycloak. The flow spans
//! two HTTP requests (redirect out, callback in), correlated by the
//! OAuth2 `state` parameter held in a process-wide pending map. A failed
//! or uncorrelated callback leaves the session anonymous; no credential
//! is ever fabricated.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::session::Identity;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Unknown or expired login state")]
    StateMismatch,

    #[error("Token endpoint returned HTTP {status}: {body}")]
    ProviderError { status: u16, body: String },

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Malformed ID token: {0}")]
    MalformedIdToken(String),
}

/// OAuth2 client settings for the authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Parsed at startup so a bad endpoint fails fast, not per login.
    pub authorization_endpoint: Url,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: String,
}

/// Successful token-endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    300
}

/// Claims read from the ID token payload for presentation.
///
/// The token arrives directly from the provider's token endpoint over the
/// back channel, so the payload is decoded without signature verification;
/// it never feeds an authorization decision.
#[derive(Debug, Deserialize)]
struct IdClaims {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Orchestrates login flows and tracks pending `state` correlations.
pub struct LoginFlow {
    config: OAuthConfig,
    http: Client,
    pending: RwLock<HashMap<String, Instant>>,
    pending_ttl: Duration,
}

impl LoginFlow {
    pub fn new(config: OAuthConfig, http: Client) -> Self {
        Self {
            config,
            http,
            pending: RwLock::new(HashMap::new()),
            pending_ttl: Duration::from_secs(300),
        }
    }

    /// Begin a login: returns the provider authorization URL to redirect
    /// the browser to, registering the generated `state` as pending.
    pub fn authorization_url(&self) -> String {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        {
            let mut pending = self.pending.write().unwrap();
            pending.retain(|_, created| created.elapsed() < self.pending_ttl);
            pending.insert(state.clone(), Instant::now());
        }

        let mut url = self.config.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", &state);

        debug!(state = %state, "Login flow started");
        url.to_string()
    }

    /// Consume a pending `state`. Returns an error if it was never issued,
    /// already used, or issued too long ago.
    pub fn take_pending(&self, state: &str) -> Result<(), LoginError> {
        let mut pending = self.pending.write().unwrap();
        match pending.remove(state) {
            Some(created) if created.elapsed() < self.pending_ttl => Ok(()),
            Some(_) => {
                warn!(state = %state, "Login state expired");
                Err(LoginError::StateMismatch)
            }
            None => {
                warn!(state = %state, "Unknown login state");
                Err(LoginError::StateMismatch)
            }
        }
    }

    /// Exchange an authorization code for tokens at the token endpoint.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, LoginError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| LoginError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Token exchange rejected");
            return Err(LoginError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| LoginError::ExchangeFailed(e.to_string()))?;

        info!("Token exchange completed");
        Ok(tokens)
    }

    /// Read identity claims from an ID token for presentation.
    ///
    /// Fallbacks: username prefers `preferred_username`, then the subject
    /// identifier; a missing email stays `None` and is rendered as an
    /// explicit placeholder.
    pub fn decode_identity(id_token: &str) -> Result<Identity, LoginError> {
        let payload = id_token
            .split('.')
            .nth(1)
            .ok_or_else(|| LoginError::MalformedIdToken("not a three-segment token".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| LoginError::MalformedIdToken(e.to_string()))?;

        let claims: IdClaims = serde_json::from_slice(&bytes)
            .map_err(|e| LoginError::MalformedIdToken(e.to_string()))?;

        let username = claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| claims.sub.clone());

        Ok(Identity {
            subject: claims.sub,
            username,
            email: claims.email,
        })
    }
}
