//! Error type for the authentication service

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{error::RepositoryError, jwt::TokenError, validation::FieldErrors};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed or missing fields
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// Bad credentials, missing/invalid/expired/revoked token
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    /// Email already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Too many login attempts
    #[error("Too many login attempts")]
    TooManyAttempts,

    /// Anything the client cannot fix; details are logged, not returned
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Type alias for auth handler results
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, err);
        AuthError::Internal(format!("{}: {}", context, err))
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => AuthError::Conflict(message),
            RepositoryError::Validation(fields) => AuthError::Validation(fields),
            RepositoryError::NotFound(_) => AuthError::Unauthorized("User not found"),
            other => AuthError::internal("Repository failure", other),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::Unauthorized("Token has expired"),
            TokenError::Invalid => AuthError::Unauthorized("Token is invalid"),
            TokenError::WrongType => AuthError::Unauthorized("Unexpected token type"),
            other => AuthError::internal("Token failure", other),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(FieldErrors::single("body", rejection.body_text()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "fields": fields }),
            ),
            AuthError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            AuthError::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": message })),
            AuthError::TooManyAttempts => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "Too many login attempts, try again later" }),
            ),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (
                AuthError::Validation(FieldErrors::single("email", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (AuthError::Unauthorized("nope"), StatusCode::UNAUTHORIZED),
            (AuthError::Conflict("taken".into()), StatusCode::CONFLICT),
            (AuthError::TooManyAttempts, StatusCode::TOO_MANY_REQUESTS),
            (
                AuthError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn token_errors_map_to_unauthorized() {
        assert!(matches!(
            AuthError::from(TokenError::Expired),
            AuthError::Unauthorized(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::WrongType),
            AuthError::Unauthorized(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::SigningUnavailable),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn conflicts_survive_repository_mapping() {
        let err = AuthError::from(RepositoryError::Conflict("taken".into()));
        assert!(matches!(err, AuthError::Conflict(message) if message == "taken"));
    }
}
