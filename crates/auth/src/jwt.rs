//! HS256 token signing and verification.
//!
//! Times are carried as RFC 3339 `issued_at` / `expires_at` claims and checked
//! by `validate_claims`, so the library's numeric `exp` handling is disabled.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{JwtClaims, LoginLinkClaims, TokenValidationError, validate_claims};
use crate::{PrincipalId, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed or badly signed token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Window(#[from] TokenValidationError),

    #[error("token was issued for '{0}'")]
    WrongPurpose(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Verifies session tokens presented by callers.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError>;
}

/// Shared-secret (HS256) validator.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation: relaxed_validation(),
        }
    }

    /// Decode and check a passwordless login link.
    pub fn validate_login_link(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginLinkClaims, AuthError> {
        let claims = jsonwebtoken::decode::<LoginLinkClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        if claims.purpose != LoginLinkClaims::PURPOSE {
            return Err(AuthError::WrongPurpose(claims.purpose));
        }
        validate_claims(claims.issued_at, claims.expires_at, now)?;
        Ok(claims)
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError> {
        let claims = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        validate_claims(claims.issued_at, claims.expires_at, now)?;
        Ok(claims)
    }
}

/// Mints session tokens and login links with the same secret the validator uses.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    session_ttl: Duration,
    login_link_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>, session_ttl: Duration, login_link_ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_ref()),
            session_ttl,
            login_link_ttl,
        }
    }

    pub fn issue_session(
        &self,
        sub: PrincipalId,
        email: impl Into<String>,
        roles: Vec<Role>,
        now: DateTime<Utc>,
    ) -> Result<(String, JwtClaims), AuthError> {
        let claims = JwtClaims {
            sub,
            email: email.into(),
            roles,
            jti: Uuid::now_v7(),
            issued_at: now,
            expires_at: now + self.session_ttl,
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn issue_login_link(
        &self,
        sub: PrincipalId,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(String, LoginLinkClaims), AuthError> {
        let claims = LoginLinkClaims {
            sub,
            email: email.into(),
            jti: Uuid::now_v7(),
            purpose: LoginLinkClaims::PURPOSE.to_string(),
            issued_at: now,
            expires_at: now + self.login_link_ttl,
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

fn relaxed_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    validation
}
