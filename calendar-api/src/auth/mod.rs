// SPDX-License-Identifier: Apache-2.0
//! Authentication and Authorization
//!
//! OIDC/JWT resource-server security for the calendar API.
//!
//! ## Components
//!
//! - **claims**: Keycloak claims structure and authority derivation
//! - **keys**: JWKS fetching and caching behind the `KeySource` trait
//! - **validator**: RS256 signature, issuer, expiry, not-before checks
//! - **middleware**: request authentication and the per-route guard

pub mod claims;
pub mod keys;
pub mod middleware;
pub mod validator;

#[cfg(test)]
pub(crate) mod testkeys;

pub use claims::{Claims, RealmAccess, ROLE_PREFIX};
pub use keys::{Jwk, Jwks, JwksKeySource, KeyError, KeySource};
pub use middleware::{
    auth_middleware, authorize, ApiError, AuthState, AuthUser, AuthenticatedUser, Requirement,
};
pub use validator::{TokenValidator, ValidationError};
