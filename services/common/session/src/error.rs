use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// Error type accepted from host callbacks and claim `valid()` hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token configuration is invalid")]
    ConfigInvalid,
    #[error("unsupported signing method '{0}'")]
    UnsupportedSigningMethod(String),
    #[error("invalid claim: {0}")]
    ClaimInvalid(#[from] ClaimViolation),
    #[error("token expired")]
    TokenExpired,
    #[error("cookie '{0}' missing")]
    CookieMissing(&'static str),
    #[error("{origin} callback failed: {source}")]
    CallbackFailed {
        origin: CallbackOrigin,
        #[source]
        source: BoxError,
    },
    #[error("token signature verification failed")]
    InvalidSignature,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("cookie '{0}' cannot be encoded as a header value")]
    InvalidCookieValue(&'static str),
}

impl SessionError {
    /// Stable machine-readable code, for logs and metrics only.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::ConfigInvalid => "SESSION_CONFIG",
            SessionError::UnsupportedSigningMethod(_) => "SESSION_ALGORITHM",
            SessionError::ClaimInvalid(_) => "SESSION_CLAIMS",
            SessionError::TokenExpired => "SESSION_EXPIRED",
            SessionError::CookieMissing(_) => "SESSION_COOKIE",
            SessionError::CallbackFailed { .. } => "SESSION_CALLBACK",
            SessionError::InvalidSignature => "SESSION_SIGNATURE",
            SessionError::MalformedToken(_) => "SESSION_TOKEN",
            SessionError::Signing(_) => "SESSION_SIGNING",
            SessionError::InvalidCookieValue(_) => "SESSION_COOKIE_VALUE",
        }
    }

    pub(crate) fn callback(origin: CallbackOrigin, source: BoxError) -> Self {
        Self::CallbackFailed { origin, source }
    }
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm => Self::UnsupportedSigningMethod(value.to_string()),
            _ => Self::MalformedToken(value.to_string()),
        }
    }
}

/// Reason a correctly signed token was refused.
#[derive(Debug, Error)]
pub enum ClaimViolation {
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token was issued in the future")]
    IssuedInFuture,
    #[error("issuer mismatch (got '{0}')")]
    IssuerMismatch(String),
    #[error("subject mismatch (got '{0}')")]
    SubjectMismatch(String),
    #[error("audience mismatch (got '{0}')")]
    AudienceMismatch(String),
    #[error("algorithm mismatch: expected {expected}, token declares {found}")]
    AlgorithmMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("{0}")]
    Domain(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOrigin {
    Enrichment,
    RefreshApproval,
}

impl fmt::Display for CallbackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackOrigin::Enrichment => f.write_str("claim enrichment"),
            CallbackOrigin::RefreshApproval => f.write_str("refresh approval"),
        }
    }
}

// Every failure looks the same to the client; detail stays in the logs.
impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}
