// SPDX-License-Identifier: Apache-2.0
//! HTTP surface of the web front-end.
//!
//! Pages are server-rendered; the browser never sees a token other than
//! the ID token shown on the secured page for demonstration. Access
//! tokens stay server-side in the session store.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{BackendClient, CallError};
use crate::oauth::LoginFlow;
use crate::session::{self, DelegatedCredential, Session, SessionStore, SESSION_COOKIE};

const LOGIN_PATH: &str = "/oauth2/authorization/keycloak";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub login: Arc<LoginFlow>,
    pub backend: Arc<BackendClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/secured", get(secured))
        .route("/call-service", get(call_service))
        .route(LOGIN_PATH, get(begin_login))
        .route("/login/oauth2/code/keycloak", get(login_callback))
        .route("/logout", get(logout))
        .route("/actuator/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

async fn index() -> Html<String> {
    Html(page(
        "Home",
        "<p>Public landing page. No login required.</p>\
         <p><a href=\"/secured\">Secured page</a> | \
         <a href=\"/call-service\">Call backend service</a></p>",
    ))
}

async fn secured(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = authenticated_session(&state, &headers) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };
    let (Some(identity), Some(credential)) =
        (session.identity.as_ref(), session.valid_credential())
    else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    let email = identity.email.as_deref().unwrap_or("No email provided");
    let body = format!(
        "<p>Welcome, <strong>{}</strong>!</p>\
         <p>Email: {}</p>\
         <p>ID token:</p><pre>{}</pre>\
         <p><a href=\"/call-service\">Call backend service</a> | \
         <a href=\"/logout\">Logout</a></p>",
        escape(&identity.username),
        escape(email),
        escape(&credential.id_token),
    );
    Html(page("Secured", &body)).into_response()
}

async fn call_service(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = authenticated_session(&state, &headers) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    match state
        .backend
        .call("/api/calendar", session.valid_credential())
        .await
    {
        Ok(body) => {
            let body = format!(
                "<p>Backend response:</p><pre>{}</pre>\
                 <p><a href=\"/secured\">Back</a></p>",
                escape(&body)
            );
            Html(page("Backend Call", &body)).into_response()
        }
        Err(CallError::NotAuthenticated) => Redirect::to(LOGIN_PATH).into_response(),
        Err(err) => {
            warn!(error = %err, "Backend call failed");
            (
                StatusCode::BAD_GATEWAY,
                Html(page("Backend Call", "<p>Backend call failed.</p>")),
            )
                .into_response()
        }
    }
}

async fn begin_login(State(state): State<AppState>) -> Redirect {
    let url = state.login.authorization_url();
    Redirect::to(&url)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Completes a login. Any failure on this path abandons the attempt and
/// leaves the browser anonymous at the landing page.
async fn login_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        warn!(error, "Authorization server reported an error");
        return Redirect::to("/").into_response();
    }

    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        warn!("Callback missing code or state");
        return Redirect::to("/").into_response();
    };

    if let Err(err) = state.login.take_pending(&login_state) {
        warn!(error = %err, "Rejecting callback");
        return Redirect::to("/").into_response();
    }

    let tokens = match state.login.exchange_code(&code).await {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(error = %err, "Token exchange failed");
            return Redirect::to("/").into_response();
        }
    };

    let identity = match LoginFlow::decode_identity(&tokens.id_token) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "Discarding tokens with unreadable ID token");
            return Redirect::to("/").into_response();
        }
    };

    info!(username = %identity.username, "Login completed");

    let session_id = state.sessions.create();
    state.sessions.set_authenticated(
        &session_id,
        DelegatedCredential::new(tokens.access_token, tokens.id_token, tokens.expires_in),
        identity,
    );

    (
        [(header::SET_COOKIE, session::session_cookie(&session_id))],
        Redirect::to("/secured"),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id);
    }
    (
        [(header::SET_COOKIE, session::clear_session_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| session::cookie_value(cookies, SESSION_COOKIE))
}

/// The session, if the cookie maps to one holding a live credential.
fn authenticated_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let session = state.sessions.get(&session_id(headers)?)?;
    session.is_authenticated().then_some(session)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>"
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
