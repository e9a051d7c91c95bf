//! Error taxonomy for the credential and analysis subsystems, plus the
//! HTTP-facing `ApiError` that shapes every failure into a short,
//! non-leaking JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Credential and token failures.
///
/// The distinction between variants is for diagnostics only; the HTTP
/// boundary collapses all of them into a generic 401.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    AuthFailure,

    #[error("token expired")]
    ExpiredToken,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },

    #[error("unexpected token issuer")]
    IssuerMismatch,

    #[error("token issued in the future")]
    NotYetValid,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("failed to encode token: {0}")]
    TokenEncoding(String),

    #[error("credential store error: {0}")]
    CredentialStore(#[from] StoreError),
}

impl AuthError {
    /// Whether this error describes a rejected token (as opposed to rejected
    /// credentials or an infrastructure fault).
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::ExpiredToken
                | AuthError::BadSignature
                | AuthError::WrongTokenType { .. }
                | AuthError::IssuerMismatch
                | AuthError::NotYetValid
                | AuthError::MalformedToken(_)
        )
    }
}

/// Failures of the analysis pipeline. Every variant aborts the request
/// without a partial result.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("system prompt unavailable: {0}")]
    PromptUnavailable(String),

    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation backend call failed: {0}")]
    BackendCallFailed(String),

    #[error("generation output failed validation: {0}")]
    MalformedGenerationOutput(String),
}

impl AnalysisError {
    fn code(&self) -> &'static str {
        match self {
            AnalysisError::PromptUnavailable(_) => "PROMPT_UNAVAILABLE",
            AnalysisError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AnalysisError::BackendCallFailed(_) => "BACKEND_CALL_FAILED",
            AnalysisError::MalformedGenerationOutput(_) => "MALFORMED_GENERATION_OUTPUT",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AnalysisError::PromptUnavailable(_) => "Analysis service is misconfigured",
            AnalysisError::BackendUnavailable(_) => "Generation backend is not configured",
            AnalysisError::BackendCallFailed(_) => "Generation backend request failed",
            AnalysisError::MalformedGenerationOutput(_) => "Assistant returned invalid JSON",
        }
    }
}

/// Failures surfaced by a generation client.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    CallFailed(String),
}

impl From<GenerationError> for AnalysisError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Unavailable(msg) => AnalysisError::BackendUnavailable(msg),
            GenerationError::CallFailed(msg) => AnalysisError::BackendCallFailed(msg),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::CallFailed(format!("request timed out: {}", err))
        } else if err.is_connect() {
            GenerationError::CallFailed(format!("connection failed: {}", err))
        } else if err.is_decode() {
            GenerationError::CallFailed(format!("invalid response body: {}", err))
        } else {
            GenerationError::CallFailed(err.to_string())
        }
    }
}

/// Persistence failures from the SQLite-backed stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// API error returned by every handler.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Unauthorized(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthFailure => ApiError::Unauthorized("invalid credentials"),
            AuthError::CredentialStore(e) => ApiError::Internal(e.to_string()),
            AuthError::TokenEncoding(e) => ApiError::Internal(e),
            e if e.is_token_error() => ApiError::Unauthorized("invalid token"),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Analysis(e) => {
                tracing::error!(code = e.code(), "analysis failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.code(),
                    e.public_message().to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_collapse_to_generic_message() {
        let variants = [
            AuthError::ExpiredToken,
            AuthError::BadSignature,
            AuthError::WrongTokenType {
                expected: "refresh".into(),
                actual: "access".into(),
            },
            AuthError::IssuerMismatch,
            AuthError::NotYetValid,
            AuthError::MalformedToken("bad base64".into()),
        ];

        for err in variants {
            assert!(err.is_token_error());
            match ApiError::from(err) {
                ApiError::Unauthorized(msg) => assert_eq!(msg, "invalid token"),
                other => panic!("unexpected mapping: {other:?}"),
            }
        }
    }

    #[test]
    fn auth_failure_maps_to_invalid_credentials() {
        assert!(!AuthError::AuthFailure.is_token_error());
        match ApiError::from(AuthError::AuthFailure) {
            ApiError::Unauthorized(msg) => assert_eq!(msg, "invalid credentials"),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn infrastructure_auth_errors_are_internal() {
        let store = AuthError::CredentialStore(StoreError::UserExists("a".into()));
        assert!(!store.is_token_error());
        assert!(matches!(ApiError::from(store), ApiError::Internal(_)));

        let encoding = AuthError::TokenEncoding("expiry out of range".into());
        assert!(!encoding.is_token_error());
        assert!(matches!(ApiError::from(encoding), ApiError::Internal(_)));
    }

    #[test]
    fn analysis_errors_are_internal_server_errors() {
        let resp = ApiError::from(AnalysisError::BackendCallFailed("connection reset".into()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ApiError::from(AnalysisError::PromptUnavailable("missing".into()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthorized_status() {
        let resp = ApiError::Unauthorized("invalid token").into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
