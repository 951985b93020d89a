// SPDX-License-Identifier: Apache-2.0
//! Auth Middleware
//!
//! Axum middleware for bearer-token authentication plus a per-route
//! authority guard. The guard is deny-by-default: a resource handler only
//! runs after its requirement has affirmatively passed.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::claims::Claims;
use super::validator::{TokenValidator, ValidationError};

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<TokenValidator>,
}

impl AuthState {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

/// Authenticated user extracted from a validated token.
///
/// Injected into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Subject (user ID)
    pub subject: String,

    /// Display username (preferred_username, falling back to sub)
    pub username: String,

    /// Authority set derived from the token presented in this request
    pub authorities: BTreeSet<String>,

    /// Full claims (for handlers needing more detail)
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            username: claims.username().to_string(),
            authorities: claims.authorities(),
            claims,
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// Authentication/authorization error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized(message: &str) -> Self {
        Self {
            error: "unauthorized".to_string(),
            message: message.to_string(),
        }
    }

    pub fn forbidden(message: &str) -> Self {
        Self {
            error: "forbidden".to_string(),
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.error == "forbidden" {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::UNAUTHORIZED
        };

        (status, Json(self)).into_response()
    }
}

/// Bearer-token authentication middleware.
///
/// Extracts and validates the token, then injects [`AuthenticatedUser`]
/// into request extensions. Every failure terminates the request with 401;
/// unreachable signing keys deny as well (fail-closed) but are logged
/// separately so operators can tell an outage from a forged token.
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let token = TokenValidator::extract_token(auth_header)
        .map_err(|e| ApiError::unauthorized(&e.to_string()))?;

    log_unverified_payload(token);

    let claims = auth_state.validator.validate(token).await.map_err(|e| {
        match &e {
            ValidationError::KeyUnreachable(msg) => {
                error!(error = %msg, "Signing keys unreachable, denying request");
            }
            other => {
                warn!(error = %other, "Token validation failed");
            }
        }
        match e {
            ValidationError::Expired => ApiError::unauthorized("Token expired"),
            ValidationError::IssuerMismatch { .. } => ApiError::unauthorized("Invalid issuer"),
            ValidationError::InvalidSignature => ApiError::unauthorized("Invalid signature"),
            ValidationError::KeyUnreachable(_) => {
                ApiError::unauthorized("Token verification unavailable")
            }
            other => ApiError::unauthorized(&other.to_string()),
        }
    })?;

    let user = AuthenticatedUser::from_claims(claims);

    debug!(
        subject = %user.subject,
        authorities = ?user.authorities,
        "User authenticated"
    );

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Authorities a route requires, all of which must be held.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub all_of: &'static [&'static str],
}

/// Per-route authority guard.
///
/// Runs after [`auth_middleware`]; a request with no authenticated user is
/// rejected as unauthenticated, a user missing any required authority as
/// forbidden.
pub async fn authorize(
    State(requirement): State<Requirement>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("No authenticated user"))?;

    for authority in requirement.all_of {
        if !user.has_authority(authority) {
            warn!(
                subject = %user.subject,
                missing = %authority,
                "Authorization denied"
            );
            return Err(ApiError::forbidden(&format!(
                "Missing required authority: {}",
                authority
            )));
        }
    }

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("No authenticated user"))
    }
}

/// Log the (unverified) token payload at debug level.
///
/// Diagnostics only: the decoded payload never feeds the authorization
/// decision, which is made from the signature-verified claims.
fn log_unverified_payload(token: &str) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let Some(payload) = token.split('.').nth(1) else {
        return;
    };

    if let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) {
        if let Ok(text) = String::from_utf8(bytes) {
            debug!(payload = %text, "Incoming token payload (unverified)");
        }
    }
}
