//! Login and refresh flows on top of the token service and credential store

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::credentials::CredentialStore;
use super::token::{Claims, TokenPair, TokenService, TokenType};
use crate::error::AuthError;
use crate::models::AuthenticatedUser;

/// Hash verified when the account is unknown so that unknown users cost the
/// same as known ones.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| bcrypt::hash("timing-equaliser", bcrypt::DEFAULT_COST).ok());

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    tokens: TokenService,
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(tokens: TokenService, store: Arc<dyn CredentialStore>) -> Self {
        Self { tokens, store }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Check a username/password pair.
    ///
    /// Unknown user, inactive account and wrong password all yield the same
    /// `AuthFailure`, and all three pay for one bcrypt verification.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let user = self.store.find_user(username).await?;

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let password_ok = verify_password(password.to_string(), stored_hash).await;

        match user {
            Some(user) if user.is_active && password_ok => {
                debug!("Authenticated user {}", user.username);
                Ok(AuthenticatedUser::from(&user))
            }
            _ => {
                debug!("Authentication rejected");
                Err(AuthError::AuthFailure)
            }
        }
    }

    /// Authenticate and issue a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self.authenticate(username, password).await?;
        let pair = self.tokens.issue(&user.username, &user.role)?;
        info!("User {} logged in", user.username);
        Ok(pair)
    }

    /// Exchange a valid refresh token for a brand-new pair.
    ///
    /// The presented token is not invalidated; there is no revocation list.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        let pair = self.tokens.issue(&claims.sub, &claims.role)?;
        debug!("Refreshed tokens for {}", claims.sub);
        Ok(pair)
    }

    /// Verify a bearer access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(token, TokenType::Access)
    }
}

/// Verify `password` against `stored_hash`, or against `DUMMY_HASH` when the
/// account is unknown. `DUMMY_HASH` is first forced inside the blocking task,
/// never on a runtime worker.
async fn verify_password(password: String, stored_hash: Option<String>) -> bool {
    let task = tokio::task::spawn_blocking(move || -> Result<bool, bcrypt::BcryptError> {
        let hash = match stored_hash.as_deref().or_else(|| DUMMY_HASH.as_deref()) {
            Some(hash) => hash,
            None => return Ok(false),
        };
        let matches = bcrypt::verify(password, hash)?;
        Ok(matches && stored_hash.is_some())
    });

    match task.await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            warn!("Stored password hash could not be verified: {}", e);
            false
        }
        Err(e) => {
            error!("Password verification task failed: {}", e);
            false
        }
    }
}
