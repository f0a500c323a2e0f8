//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use common::jwt::TokenType;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AuthError, state::AppState};

/// Caller identity placed in request extensions by [`auth_middleware`]
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Require a valid access token in the `Authorization: Bearer` header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::Unauthorized("Missing bearer token"))?;

    let claims = state
        .jwt_service
        .validate_typed(bearer.token(), TokenType::Access)
        .map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            AuthError::from(e)
        })?;

    req.extensions_mut().insert(AuthUser { id: claims.sub });

    Ok(next.run(req).await)
}
