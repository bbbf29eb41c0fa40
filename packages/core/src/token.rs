//! Bearer token verification.
//!
//! Pure function of the token, the shared secret, and a time snapshot --
//! no network I/O, no implicit clock reads, so the same three inputs
//! always produce the same result (see `verify_at`).

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::claims::Claims;

/// Reasons a token fails verification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token claims missing required fields")]
    InvalidClaims,
}

/// Raw claim shape as encoded on the wire. `exp` is validated separately
/// against the caller-supplied `now` rather than jsonwebtoken's own clock,
/// so verification stays a pure function of its three inputs.
#[derive(Debug, serde::Deserialize)]
struct RawClaims {
    sub: Option<String>,
    username: Option<String>,
    email: Option<String>,
    exp: Option<u64>,
}

/// Verifies a `HS256`-signed bearer token.
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies `token` against the configured secret at time `now`
    /// (Unix seconds).
    ///
    /// Only `HS256` is accepted; `jsonwebtoken`'s [`Validation`] pins the
    /// algorithm so a token signed `alg: none` or with an asymmetric key
    /// is rejected before signature verification even runs.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidFormat`] for a malformed JWT,
    /// [`TokenError::InvalidSignature`] for a signature mismatch or
    /// algorithm confusion attempt, [`TokenError::Expired`] if `exp` is at
    /// or before `now`, and [`TokenError::InvalidClaims`] if `sub`,
    /// `username`, or `email` is missing.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<RawClaims>(token, &key, &validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            match err.kind() {
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    TokenError::InvalidFormat
                }
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::InvalidFormat,
            }
        })?;

        let raw = data.claims;
        let exp = raw.exp.ok_or(TokenError::InvalidClaims)?;
        if exp <= now {
            return Err(TokenError::Expired);
        }

        let user_id = raw.sub.ok_or(TokenError::InvalidClaims)?;
        let username = raw.username.ok_or(TokenError::InvalidClaims)?;
        let email = raw.email.ok_or(TokenError::InvalidClaims)?;
        if user_id.is_empty() {
            return Err(TokenError::InvalidClaims);
        }

        Ok(Claims {
            user_id,
            username,
            email,
            exp,
        })
    }
}
