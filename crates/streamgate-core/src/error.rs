use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a verification failure, used for logging and
/// diagnostics rather than control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    MissingKey,
    Expired,
    Malformed,
    InvalidSignature,
    InvalidAudience,
    VerificationFailed,
}

/// Token verification errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No usable verification key configured")]
    MissingKey,

    #[error("Token has expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token audience: expected '{app_id}' or '{broker_id}'")]
    InvalidAudience { app_id: String, broker_id: String },

    #[error("Token verification failed: {0}")]
    VerificationFailed(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MissingKey => AuthErrorKind::MissingKey,
            Self::Expired => AuthErrorKind::Expired,
            Self::Malformed(_) => AuthErrorKind::Malformed,
            Self::InvalidSignature => AuthErrorKind::InvalidSignature,
            Self::InvalidAudience { .. } => AuthErrorKind::InvalidAudience,
            Self::VerificationFailed(_) => AuthErrorKind::VerificationFailed,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            // A token whose header names another algorithm is a signature
            // mismatch as far as the caller is concerned.
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::Malformed(err.to_string()),
            _ => Self::VerificationFailed(err.to_string()),
        }
    }
}

/// Errors raised while writing to an open event stream
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("Stream is closed")]
    Closed,
}
