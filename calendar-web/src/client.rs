// SPDX-License-Identifier: Apache-2.0
//! Delegated calls to the protected backend.
//!
//! Every call carries the session's access token and runs inside the
//! resilience envelope. Envelope rejections and call failures never
//! surface as errors to the caller; they degrade into a human-readable
//! fallback message rendered in place of backend data.

use std::time::Duration;
use tracing::warn;

use crate::resilience::{Bulkhead, CircuitBreaker, RetryPolicy};
use crate::session::DelegatedCredential;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("no valid credential in session")]
    NotAuthenticated,
    #[error("too many concurrent backend calls")]
    BulkheadFull,
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("backend call timed out")]
    Timeout,
    #[error("backend connection failed: {0}")]
    Connect(String),
    #[error("backend returned HTTP {status}")]
    Http { status: u16, body: String },
    #[error("backend call failed: {0}")]
    Other(String),
}

impl CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Timeout | CallError::Connect(_) | CallError::Other(_) => true,
            CallError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message shown to the user when the backend could not be reached.
    pub fn fallback_message(&self) -> String {
        match self {
            CallError::Http { status, .. } => format!(
                "Backend service temporarily unavailable (HTTP {status}). Please try again later."
            ),
            CallError::Connect(_) => "Backend service is currently down. Our team has been \
                                      notified. Please try again in a few minutes."
                .to_string(),
            CallError::Timeout => "Request timed out. The backend service is taking too long \
                                   to respond. Please try again."
                .to_string(),
            _ => "Service temporarily unavailable. We're working on it. Please try again shortly."
                .to_string(),
        }
    }
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    bulkhead: Bulkhead,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl BackendClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        bulkhead: Bulkhead,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            bulkhead,
            breaker,
            retry,
            call_timeout,
        }
    }

    /// Call `path` on the backend with the session's access token.
    ///
    /// `Err` only when there is no usable credential. Backend failures and
    /// envelope rejections come back as `Ok` with a fallback message.
    pub async fn call(
        &self,
        path: &str,
        credential: Option<&DelegatedCredential>,
    ) -> Result<String, CallError> {
        let credential = credential.ok_or(CallError::NotAuthenticated)?;

        let _permit = match self.bulkhead.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(path, "Bulkhead rejected backend call");
                return Ok(CallError::BulkheadFull.fallback_message());
            }
        };

        // The permit records a failure if this future is dropped before
        // the call resolves, so cancellations count against the window.
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(path, "Circuit breaker rejected backend call");
                return Ok(CallError::CircuitOpen.fallback_message());
            }
        };

        let result = self
            .retry
            .run(
                || self.attempt(path, &credential.access_token),
                CallError::is_retryable,
            )
            .await;

        match result {
            Ok(body) => {
                permit.success();
                Ok(body)
            }
            Err(err) => {
                permit.failure();
                warn!(path, error = %err, "Backend call failed, serving fallback");
                Ok(err.fallback_message())
            }
        }
    }

    async fn attempt(&self, path: &str, access_token: &str) -> Result<String, CallError> {
        let url = self.build_url(path);
        let response = tokio::time::timeout(
            self.call_timeout,
            self.http.get(&url).bearer_auth(access_token).send(),
        )
        .await
        .map_err(|_| CallError::Timeout)?
        .map_err(|err| {
            if err.is_connect() {
                CallError::Connect(err.to_string())
            } else {
                CallError::Other(err.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CallError::Other(err.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(CallError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerConfig;

    fn test_client(base_url: &str) -> BackendClient {
        BackendClient::new(
            reqwest::Client::new(),
            base_url.to_string(),
            Bulkhead::new(2),
            CircuitBreaker::new(BreakerConfig {
                window_size: 2,
                ..BreakerConfig::default()
            }),
            RetryPolicy::new(1, Duration::from_millis(1)),
            Duration::from_secs(1),
        )
    }

    fn credential() -> DelegatedCredential {
        DelegatedCredential::new("access".to_string(), "id".to_string(), 300)
    }

    #[test]
    fn test_build_url_joins_slashes() {
        let client = test_client("http://localhost:8082");
        assert_eq!(
            client.build_url("/api/calendar"),
            "http://localhost:8082/api/calendar"
        );

        let client = test_client("http://localhost:8082/");
        assert_eq!(
            client.build_url("api/calendar"),
            "http://localhost:8082/api/calendar"
        );
    }

    #[test]
    fn test_fallback_messages() {
        assert!(CallError::Http {
            status: 503,
            body: String::new()
        }
        .fallback_message()
        .contains("HTTP 503"));
        assert!(CallError::Connect("refused".into())
            .fallback_message()
            .contains("currently down"));
        assert!(CallError::Timeout.fallback_message().contains("timed out"));
        assert!(CallError::CircuitOpen
            .fallback_message()
            .contains("temporarily unavailable"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CallError::Timeout.is_retryable());
        assert!(CallError::Connect("refused".into()).is_retryable());
        assert!(CallError::Http {
            status: 500,
            body: String::new()
        }
        .is_retryable());
        assert!(!CallError::Http {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!CallError::CircuitOpen.is_retryable());
    }

    #[tokio::test]
    async fn test_call_without_credential_is_an_error() {
        let client = test_client("http://localhost:8082");
        let result = client.call("/api/calendar", None).await;
        assert!(matches!(result, Err(CallError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_serves_connect_fallback() {
        // Port 1 is never listening.
        let client = test_client("http://127.0.0.1:1");
        let body = client.call("/api/calendar", Some(&credential())).await.unwrap();
        assert!(body.contains("currently down"), "got: {body}");
    }

    #[tokio::test]
    async fn test_full_bulkhead_serves_fallback_without_calling() {
        let client = BackendClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1".to_string(),
            Bulkhead::new(1),
            CircuitBreaker::new(BreakerConfig::default()),
            RetryPolicy::new(1, Duration::from_millis(1)),
            Duration::from_secs(1),
        );

        let _held = client.bulkhead.try_acquire().unwrap();
        let body = client.call("/api/calendar", Some(&credential())).await.unwrap();
        assert!(body.contains("temporarily unavailable"), "got: {body}");
        // The rejected call must not count against the breaker window.
        assert_eq!(
            client.breaker.state(),
            crate::resilience::BreakerState::Closed
        );
    }

    #[tokio::test]
    async fn test_aborted_call_still_resolves_the_breaker() {
        use crate::resilience::BreakerState;
        use std::sync::Arc;

        // Backend that accepts connections but never answers, so a call
        // in flight hangs until its task is aborted.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    open.push(socket);
                }
            }
        });

        let client = Arc::new(BackendClient::new(
            reqwest::Client::new(),
            format!("http://{addr}"),
            Bulkhead::new(2),
            CircuitBreaker::new(BreakerConfig {
                window_size: 1,
                failure_rate_threshold: 0.5,
                cool_down: Duration::from_millis(50),
                half_open_trials: 1,
            }),
            RetryPolicy::new(1, Duration::from_millis(1)),
            Duration::from_secs(5),
        ));

        client.breaker.record_failure();
        assert_eq!(client.breaker.state(), BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(client.breaker.state(), BreakerState::HalfOpen);

        // Abort the only trial call while it hangs against the backend.
        let task_client = Arc::clone(&client);
        let handle = tokio::spawn(async move {
            let _ = task_client.call("/api/calendar", Some(&credential())).await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The abandoned trial counted as a failure and reopened the
        // breaker; after another cool-down it admits trials again.
        assert_eq!(client.breaker.state(), BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(client.breaker.state(), BreakerState::HalfOpen);
        assert_eq!(client.bulkhead.available(), 2);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let client = test_client("http://127.0.0.1:1");

        // Two failed calls fill the window and open the breaker.
        client.call("/api/calendar", Some(&credential())).await.unwrap();
        client.call("/api/calendar", Some(&credential())).await.unwrap();

        let body = client.call("/api/calendar", Some(&credential())).await.unwrap();
        assert!(body.contains("temporarily unavailable"), "got: {body}");
    }
}
