//! Authentication for the analyst API
//!
//! - `token`: issuing and verifying access/refresh JWT pairs
//! - `credentials`: user lookup against the credential store
//! - `service`: login and refresh flows
//! - `JwtAuth`: bearer-token extractor guarding protected routes

pub mod credentials;
pub mod service;
pub mod token;

pub use credentials::CredentialStore;
pub use service::{AuthService, LoginRequest, RefreshRequest};
pub use token::{Claims, TokenPair, TokenService, TokenType};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::handlers::AppState;

/// Verified access-token claims attached to a request.
///
/// Expects `Authorization: Bearer <access token>`.
#[derive(Debug, Clone)]
pub struct JwtAuth {
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppState> for JwtAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            tracing::debug!("Authorization header missing or not a bearer token");
            ApiError::Unauthorized("missing bearer token")
        })?;

        match state.auth.verify_access(token) {
            Ok(claims) => {
                tracing::debug!("Access token validated for user: {}", claims.sub);
                Ok(JwtAuth { claims })
            }
            Err(e) => {
                tracing::debug!("Access token rejected: {}", e);
                Err(ApiError::Unauthorized("invalid token"))
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/analyze");
        if let Some(value) = header {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
