// SPDX-License-Identifier: Apache-2.0
//! Token Validation
//!
//! Verifies a bearer token's RS256 signature against the provider's
//! published keys, then checks issuer, expiry, and not-before in that
//! order. The first failing check determines the failure classification.
//! A key fetch failure denies the request (fail-closed) and is
//! distinguishable from a forged signature.

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::claims::Claims;
use super::keys::{KeyError, KeySource};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid issuer: expected {expected}")]
    IssuerMismatch { expected: String },

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Signing keys unreachable: {0}")]
    KeyUnreachable(String),
}

impl From<KeyError> for ValidationError {
    fn from(e: KeyError) -> Self {
        match e {
            // A kid the provider does not publish cannot be verified; it
            // is indistinguishable from a forged token.
            KeyError::UnknownKid(_) => ValidationError::InvalidSignature,
            KeyError::Unreachable(msg) => ValidationError::KeyUnreachable(msg),
            KeyError::BadKey(msg) => ValidationError::KeyUnreachable(msg),
        }
    }
}

/// Token validator backed by a [`KeySource`].
pub struct TokenValidator {
    keys: Arc<dyn KeySource>,
    expected_issuer: String,
    leeway_seconds: i64,
}

impl TokenValidator {
    pub fn new(keys: Arc<dyn KeySource>, expected_issuer: String) -> Self {
        Self {
            keys,
            expected_issuer,
            leeway_seconds: 30,
        }
    }

    /// Validate a raw token string and extract its claims.
    pub async fn validate(&self, token: &str) -> Result<Claims, ValidationError> {
        let header = decode_header(token)
            .map_err(|e| ValidationError::Malformed(format!("Invalid token header: {}", e)))?;

        if header.alg != Algorithm::RS256 {
            return Err(ValidationError::Malformed(format!(
                "Unsupported algorithm: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| ValidationError::Malformed("Missing kid in token header".to_string()))?;

        let decoding_key = self.keys.decoding_key(&kid).await?;

        // Signature and structure only; issuer, expiry, and not-before are
        // checked explicitly below so the failure ordering is fixed.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data =
            decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ValidationError::InvalidSignature
                }
                _ => ValidationError::Malformed(e.to_string()),
            })?;

        let claims = token_data.claims;
        let now = chrono::Utc::now().timestamp();

        if claims.iss != self.expected_issuer {
            return Err(ValidationError::IssuerMismatch {
                expected: self.expected_issuer.clone(),
            });
        }

        if claims.exp + self.leeway_seconds < now {
            return Err(ValidationError::Expired);
        }

        if let Some(nbf) = claims.nbf {
            if nbf - self.leeway_seconds > now {
                return Err(ValidationError::NotYetValid);
            }
        }

        debug!(sub = %claims.sub, "Token validated successfully");

        Ok(claims)
    }

    /// Extract a token from an Authorization header value.
    pub fn extract_token(auth_header: &str) -> Result<&str, ValidationError> {
        let parts: Vec<&str> = auth_header.splitn(2, ' ').collect();

        if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
            return Err(ValidationError::Malformed(
                "Expected 'Bearer <token>'".to_string(),
            ));
        }

        Ok(parts[1].trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testkeys::{self, TEST_ISSUER};
    use async_trait::async_trait;
    use jsonwebtoken::DecodingKey;

    struct UnreachableKeySource;

    #[async_trait]
    impl KeySource for UnreachableKeySource {
        async fn decoding_key(&self, _kid: &str) -> Result<DecodingKey, KeyError> {
            Err(KeyError::Unreachable("connection refused".to_string()))
        }
    }

    fn validator() -> TokenValidator {
        TokenValidator::new(testkeys::static_source(), TEST_ISSUER.to_string())
    }

    #[tokio::test]
    async fn test_valid_token() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, 3600, &["calendar-user"]));
        let claims = validator().validate(&token).await.unwrap();

        assert_eq!(claims.sub, "user-123");
        assert!(claims.authorities().contains("openid"));
        assert!(claims.authorities().contains("role:calendar-user"));
    }

    #[tokio::test]
    async fn test_same_token_yields_same_authorities() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, 3600, &["calendar-user"]));
        let v = validator();

        let first = v.validate(&token).await.unwrap().authorities();
        let second = v.validate(&token).await.unwrap().authorities();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_wrong_key_is_invalid_signature() {
        let token =
            testkeys::sign_with_wrong_key(&testkeys::payload(TEST_ISSUER, 3600, &["calendar-user"]));
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_unknown_kid_is_invalid_signature() {
        let token = testkeys::sign_with_kid(
            &testkeys::payload(TEST_ISSUER, 3600, &[]),
            "rotated-away-kid",
        );
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let token = testkeys::sign(&testkeys::payload("http://evil.example.com", 3600, &[]));
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::IssuerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, -3600, &[]));
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::Expired));
    }

    #[tokio::test]
    async fn test_issuer_checked_before_expiry() {
        // Wrong issuer AND expired: the issuer check comes first.
        let token = testkeys::sign(&testkeys::payload("http://evil.example.com", -3600, &[]));
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::IssuerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_key_fetch_failure_is_fail_closed() {
        let v = TokenValidator::new(
            Arc::new(UnreachableKeySource),
            TEST_ISSUER.to_string(),
        );
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, 3600, &[]));
        let err = v.validate(&token).await.unwrap_err();
        assert!(matches!(err, ValidationError::KeyUnreachable(_)));
    }

    #[test]
    fn test_extract_token_bearer() {
        let token = TokenValidator::extract_token("Bearer abc.def.ghi").unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn test_extract_token_lowercase_bearer() {
        let token = TokenValidator::extract_token("bearer abc.def.ghi").unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn test_extract_token_wrong_scheme() {
        let result = TokenValidator::extract_token("Basic dXNlcjpwYXNz");
        assert!(matches!(result, Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn test_extract_token_no_scheme() {
        let result = TokenValidator::extract_token("abc.def.ghi");
        assert!(matches!(result, Err(ValidationError::Malformed(_))));
    }
}
