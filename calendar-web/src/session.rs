// SPDX-License-Identifier: Apache-2.0
//! Session Store
//!
//! In-memory, process-wide session store keyed by an opaque cookie value.
//! A session holds at most one delegated credential (access token +
//! ID token) and the identity snapshot taken at login. An expired
//! credential is treated exactly like a missing one.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "WEB_SESSION";

/// Access + ID token pair obtained on the user's behalf.
#[derive(Debug, Clone)]
pub struct DelegatedCredential {
    pub access_token: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

impl DelegatedCredential {
    pub fn new(access_token: String, id_token: String, expires_in_secs: i64) -> Self {
        Self {
            access_token,
            id_token,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Identity claims read from the ID token for presentation.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub username: String,
    pub email: Option<String>,
}

/// A user session. Anonymous until a login flow completes.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub credential: Option<DelegatedCredential>,
    pub identity: Option<Identity>,
}

impl Session {
    /// The credential, if present and not past its provider-side expiry.
    pub fn valid_credential(&self) -> Option<&DelegatedCredential> {
        self.credential.as_ref().filter(|c| !c.is_expired())
    }

    pub fn is_authenticated(&self) -> bool {
        self.valid_credential().is_some()
    }
}

/// Process-wide session store.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new anonymous session, returning its id.
    pub fn create(&self) -> String {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.sessions
            .write()
            .unwrap()
            .insert(id.clone(), Session::default());
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    /// Complete a login: attach the delegated credential and identity.
    pub fn set_authenticated(&self, id: &str, credential: DelegatedCredential, identity: Identity) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(id.to_string()).or_default();
        session.credential = Some(credential);
        session.identity = Some(identity);
    }

    /// Logout: drop the session entirely.
    pub fn remove(&self, id: &str) {
        self.sessions.write().unwrap().remove(id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a cookie value from a `Cookie` header.
pub fn cookie_value(cookies: &str, cookie_name: &str) -> Option<String> {
    for cookie in cookies.split(';') {
        let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
        if parts.len() == 2 && parts[0] == cookie_name {
            return Some(parts[1].to_string());
        }
    }
    None
}

/// Session cookie header value for a freshly created session.
pub fn session_cookie(id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}

/// Session cookie header value that clears the cookie.
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
}
