// SPDX-License-Identifier: Apache-2.0
//! JWT Claims
//!
//! Claims structure for Keycloak access tokens and the authority set
//! derived from them.
//!
//! Expected claims:
//! - sub: Subject (user ID)
//! - preferred_username: User's display name
//! - scope: Space-delimited OAuth2 scopes
//! - realm_access.roles: Keycloak realm roles

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Standard JWT claims from Keycloak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID in Keycloak)
    pub sub: String,

    /// Token expiration time (Unix timestamp)
    pub exp: i64,

    /// Token issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    /// Not-before time (Unix timestamp), optional
    #[serde(default)]
    pub nbf: Option<i64>,

    /// Token issuer (Keycloak realm URL)
    pub iss: String,

    /// Preferred username
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// Space-delimited scope string
    #[serde(default)]
    pub scope: Option<String>,

    /// Realm-level roles
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

/// Realm-level access roles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealmAccess {
    /// List of realm roles
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Prefix applied to realm roles when mapped into the authority namespace.
pub const ROLE_PREFIX: &str = "role:";

impl Claims {
    /// Get the username, falling back to the subject identifier.
    pub fn username(&self) -> &str {
        self.preferred_username.as_deref().unwrap_or(&self.sub)
    }

    /// Get scopes as a vector.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Get all realm roles.
    pub fn realm_roles(&self) -> Vec<&str> {
        self.realm_access
            .as_ref()
            .map(|r| r.roles.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Derive the authority set for this token.
    ///
    /// Scopes are used verbatim; realm roles are re-prefixed with
    /// [`ROLE_PREFIX`] before being unioned in. The set is computed fresh
    /// from the claims on every call, so two validations of the same token
    /// always observe the same authorities.
    pub fn authorities(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.scopes().iter().map(|s| s.to_string()).collect();
        for role in self.realm_roles() {
            set.insert(format!("{}{}", ROLE_PREFIX, role));
        }
        set
    }
}
