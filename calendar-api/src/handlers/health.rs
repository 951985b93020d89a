// SPDX-License-Identifier: Apache-2.0
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Health endpoint, always 200 and unauthenticated (container probes).
///
/// # Endpoint
/// `GET /actuator/health`
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "UP" }))
}
