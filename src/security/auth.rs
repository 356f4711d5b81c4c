//! Bearer token verification.
//!
//! # Responsibilities
//! - Parse the `Authorization` header as `Bearer <token>`
//! - Verify the token signature with the shared secret and configured algorithm
//! - Reject expired tokens distinctly from otherwise invalid ones
//!
//! # Design Decisions
//! - Pure: no I/O, no caching of verification results
//! - Claims are passed through untouched; the gateway does not interpret them
//!   beyond the subject used as a rate limit key
//! - Tokens are only verified here, never minted

use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingCredential,

    #[error("Invalid authorization scheme")]
    MalformedCredential,

    #[error("Token has expired")]
    CredentialExpired,

    #[error("Invalid token")]
    InvalidCredential,
}

/// Decoded token claims, opaque to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthClaims(Map<String, Value>);

impl AuthClaims {
    /// The `sub` claim, if present and a string.
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// The `exp` claim as seconds since the epoch.
    pub fn expires_at(&self) -> Option<u64> {
        self.0.get("exp").and_then(Value::as_u64)
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }
}

impl From<Map<String, Value>> for AuthClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

/// Verifies bearer credentials against a shared secret.
#[derive(Clone)]
pub struct AuthVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    /// Build a verifier. Fails when the algorithm name is unknown.
    pub fn new(config: &AuthConfig) -> Result<Self, jsonwebtoken::errors::Error> {
        let algorithm = Algorithm::from_str(&config.jwt_algorithm)?;
        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;

        Ok(Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        })
    }

    /// Validate the raw `Authorization` header value.
    pub fn authenticate(&self, credential_header: Option<&str>) -> Result<AuthClaims, AuthError> {
        let header = credential_header.ok_or(AuthError::MissingCredential)?;

        let mut parts = header.split_whitespace();
        let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(token), None) => (scheme, token),
            _ => return Err(AuthError::MalformedCredential),
        };
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::MalformedCredential);
        }

        decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| AuthClaims(data.claims))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::CredentialExpired,
                _ => AuthError::InvalidCredential,
            })
    }
}
