// SPDX-License-Identifier: Apache-2.0
//! Protected Resource Endpoints
//!
//! Business logic is intentionally trivial; the interesting part is that
//! no handler here runs unless the auth middleware and the per-route
//! authority guard have both passed.

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;

use crate::auth::{auth_middleware, authorize, AuthState, AuthUser, Requirement};

const PROTECTED_DATA_REQUIREMENT: Requirement = Requirement {
    all_of: &["openid"],
};

const CALENDAR_REQUIREMENT: Requirement = Requirement {
    all_of: &["openid", "role:calendar-user"],
};

/// Calendar endpoint response body.
#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub service: &'static str,
    pub message: &'static str,
    pub user: String,
    pub timestamp: String,
    pub status: &'static str,
    pub token_verified: bool,
    pub data: CalendarData,
}

#[derive(Debug, Serialize)]
pub struct CalendarData {
    pub description: &'static str,
    pub authorities: Vec<String>,
    pub principal_name: String,
}

/// `GET /api/protected-data`: requires the `openid` authority.
async fn protected_data() -> &'static str {
    "This is protected data from the REST service! Only valid tokens can access this."
}

/// `GET /api/calendar`: requires `openid` AND `role:calendar-user`.
async fn calendar(AuthUser(user): AuthUser) -> Json<CalendarResponse> {
    Json(CalendarResponse {
        service: "CALENDAR",
        message: "Calendar Service Data - Protected by Keycloak Token",
        user: user.username.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        status: "success",
        token_verified: true,
        data: CalendarData {
            description: "This endpoint requires a valid Keycloak JWT token",
            authorities: user.authorities.iter().cloned().collect(),
            principal_name: user.username,
        },
    })
}

/// Build the authenticated `/api` routes.
///
/// The auth middleware is the outer layer; each route additionally carries
/// its own authority requirement.
pub fn api_router(auth_state: AuthState) -> Router {
    let protected_data_route = Router::new()
        .route("/api/protected-data", get(protected_data))
        .route_layer(middleware::from_fn_with_state(
            PROTECTED_DATA_REQUIREMENT,
            authorize,
        ));

    let calendar_route = Router::new()
        .route("/api/calendar", get(calendar))
        .route_layer(middleware::from_fn_with_state(
            CALENDAR_REQUIREMENT,
            authorize,
        ));

    Router::new()
        .merge(protected_data_route)
        .merge(calendar_route)
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testkeys::{self, TEST_ISSUER};
    use crate::auth::TokenValidator;
    use axum::body::Body;
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let validator = Arc::new(TokenValidator::new(
            testkeys::static_source(),
            TEST_ISSUER.to_string(),
        ));
        api_router(AuthState::new(validator))
    }

    async fn request(app: Router, path: &str, token: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_no_token_is_unauthorized() {
        for path in ["/api/protected-data", "/api/calendar"] {
            let response = request(test_app(), path, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let response = request(test_app(), "/api/protected-data", Some("not-a-jwt")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forged_signature_is_unauthorized_on_both_endpoints() {
        // Claims would grant everything, but the signature does not verify.
        let token = testkeys::sign_with_wrong_key(&testkeys::payload(
            TEST_ISSUER,
            3600,
            &["calendar-user"],
        ));

        for path in ["/api/protected-data", "/api/calendar"] {
            let response = request(test_app(), path, Some(&token)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthorized() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, -3600, &["calendar-user"]));
        let response = request(test_app(), "/api/calendar", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_openid_scope_without_role() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, 3600, &[]));

        let response = request(test_app(), "/api/protected-data", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = request(test_app(), "/api/calendar", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_calendar_with_role() {
        let token = testkeys::sign(&testkeys::payload(TEST_ISSUER, 3600, &["calendar-user"]));
        let response = request(test_app(), "/api/calendar", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["service"], "CALENDAR");
        assert_eq!(body["status"], "success");
        assert_eq!(body["token_verified"], true);
        assert_eq!(body["user"], "john.doe");
        assert_eq!(body["data"]["principal_name"], "john.doe");

        let authorities: Vec<String> = body["data"]["authorities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(authorities.contains(&"openid".to_string()));
        assert!(authorities.contains(&"role:calendar-user".to_string()));
    }
}
