//! Bearer token middleware.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use log::debug;
use subtle::ConstantTimeEq;

use super::AuthError;

/// Shared-secret authentication state.
#[derive(Clone)]
pub struct AuthState {
    api_token: Arc<str>,
}

impl AuthState {
    pub fn new(api_token: impl Into<Arc<str>>) -> Self {
        Self {
            api_token: api_token.into(),
        }
    }

    /// Check a presented token against the configured secret.
    pub fn validate_token(&self, token: &str) -> Result<(), AuthError> {
        if bool::from(token.as_bytes().ct_eq(self.api_token.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}

fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// Reject requests without a valid `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = bearer_token_from_header(header)?;
    if let Err(err) = auth.validate_token(token) {
        debug!("rejected request to {}: {err}", req.uri().path());
        return Err(err);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_from_header() {
        assert_eq!(bearer_token_from_header("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token_from_header("bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token_from_header("Bearer   abc  ").unwrap(), "abc");
    }

    #[test]
    fn test_bearer_token_from_header_rejects_malformed() {
        assert!(matches!(
            bearer_token_from_header(""),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token_from_header("Bearer"),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token_from_header("Basic abc"),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token_from_header("Bearer abc def"),
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    #[test]
    fn test_validate_token() {
        let auth = AuthState::new("s3cret");
        assert!(auth.validate_token("s3cret").is_ok());
        assert!(matches!(
            auth.validate_token("s3creT"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.validate_token("s3cret-longer"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(auth.validate_token(""), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_validate_token_rejects_prefix_and_extension() {
        let auth = AuthState::new("s3cret");
        for candidate in ["s3cre", "s3cret\0", "S3CRET", "s3cret "] {
            assert!(
                matches!(auth.validate_token(candidate), Err(AuthError::InvalidToken)),
                "{candidate:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_hides_token() {
        let shown = format!("{:?}", AuthState::new("s3cret"));
        assert!(!shown.contains("s3cret"));
    }
}
