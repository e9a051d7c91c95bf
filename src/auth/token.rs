//! Signed, time-bounded access/refresh token pairs
//!
//! Tokens are HS256 JWTs and carry everything needed to verify them; no
//! server-side session or revocation state exists. A refresh exchange mints
//! a new pair but leaves the presented refresh token valid until it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::{SecurityConfig, MAX_TOKEN_MINUTES, TOKEN_ISSUER};
use crate::error::AuthError;

/// Token purpose, carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Role label of the subject
    pub role: String,
    /// Token purpose
    pub typ: TokenType,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenPair {
    fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: &SecurityConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: TOKEN_ISSUER.to_string(),
            access_ttl: Duration::minutes(config.access_token_minutes.clamp(1, MAX_TOKEN_MINUTES)),
            refresh_ttl: Duration::minutes(config.refresh_token_minutes.clamp(1, MAX_TOKEN_MINUTES)),
        }
    }

    /// Issue a fresh access/refresh pair for `subject`.
    pub fn issue(&self, subject: &str, role: &str) -> Result<TokenPair, AuthError> {
        self.issue_at(subject, role, Utc::now())
    }

    /// Issue a pair stamped with `now`. Both tokens share subject, role and
    /// issue time; only `typ` and expiry differ.
    pub fn issue_at(
        &self,
        subject: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let access = self.sign(subject, role, TokenType::Access, now, self.access_ttl)?;
        let refresh = self.sign(subject, role, TokenType::Refresh, now, self.refresh_ttl)?;
        Ok(TokenPair::bearer(access, refresh))
    }

    /// Verify `token` against the current clock.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        self.verify_at(token, expected, Utc::now())
    }

    /// Verify `token` as of `now`.
    ///
    /// Expiry is checked before the signature, so an expired token reports
    /// `ExpiredToken` whatever its signature.
    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let unverified = self.peek_claims(token)?;
        let now_ts = now.timestamp();

        if now_ts >= unverified.exp {
            debug!("Token expired at {}", unverified.exp);
            return Err(AuthError::ExpiredToken);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.strict_validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
                _ => AuthError::MalformedToken(e.to_string()),
            })?;

        if claims.iat > now_ts {
            return Err(AuthError::NotYetValid);
        }

        if claims.typ != expected {
            return Err(AuthError::WrongTokenType {
                expected: expected.to_string(),
                actual: claims.typ.to_string(),
            });
        }

        Ok(claims)
    }

    fn sign(
        &self,
        subject: &str,
        role: &str,
        typ: TokenType,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::TokenEncoding("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            typ,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }

    /// Decode the payload without trusting it, to read `exp`.
    fn peek_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::MalformedToken(e.to_string()))
    }

    fn strict_validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is enforced against the caller's clock in verify_at
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation
    }
}
