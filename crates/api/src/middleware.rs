use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use woodhop_auth::JwtValidator;

use crate::context::PrincipalContext;

/// Session token ids invalidated by logout.
#[derive(Debug, Default)]
pub struct RevokedTokens {
    inner: Mutex<HashSet<Uuid>>,
}

impl RevokedTokens {
    pub fn revoke(&self, jti: Uuid) {
        match self.inner.lock() {
            Ok(mut set) => set.insert(jti),
            Err(poisoned) => poisoned.into_inner().insert(jti),
        };
    }

    pub fn is_revoked(&self, jti: &Uuid) -> bool {
        match self.inner.lock() {
            Ok(set) => set.contains(jti),
            Err(poisoned) => poisoned.into_inner().contains(jti),
        }
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub revoked: Arc<RevokedTokens>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected session token");
        StatusCode::UNAUTHORIZED
    })?;
    if state.revoked.is_revoked(&claims.jti) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.email, claims.roles, claims.jti));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer  tok "));
        assert_eq!(extract_bearer(&headers), Ok("tok"));
    }

    #[test]
    fn revoked_ids_stay_revoked() {
        let revoked = RevokedTokens::default();
        let jti = Uuid::now_v7();
        assert!(!revoked.is_revoked(&jti));
        revoked.revoke(jti);
        assert!(revoked.is_revoked(&jti));
    }
}
