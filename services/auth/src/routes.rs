//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use common::{jwt::TokenType, validation::FieldErrors};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    error::{AuthError, AuthResult},
    middleware::{AuthUser, auth_middleware},
    models::{NewUser, ProfileResponse, UpdateProfile, User, UserResponse},
    repositories::user::{verify_dummy_password, verify_password},
    state::AppState,
    validation::{
        normalize_email, validate_email, validate_name, validate_password,
        validate_password_confirmation,
    },
};

const FIRST_NAME_MAX: usize = 30;
const LAST_NAME_MAX: usize = 150;

/// Request for token generation
#[derive(Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Response for token generation and registration
#[derive(Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
    #[serde(flatten)]
    pub user: UserResponse,
}

/// Request carrying a refresh token
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh: String,
}

/// Response for token refresh
#[derive(Serialize)]
pub struct RefreshTokenResponse {
    pub access: String,
}

/// Request for user registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RegisterRequest {
    fn validate(self) -> Result<NewUser, FieldErrors> {
        let email = normalize_email(&self.email);
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();

        let mut errors = FieldErrors::new();
        errors.check("email", validate_email(&email));
        errors.check("password", validate_password(&self.password));
        errors.check(
            "password2",
            validate_password_confirmation(&self.password, &self.password2),
        );
        errors.check("first_name", validate_name(&first_name, FIRST_NAME_MAX));
        errors.check("last_name", validate_name(&last_name, LAST_NAME_MAX));
        errors.into_result()?;

        Ok(NewUser {
            email,
            password: self.password,
            first_name,
            last_name,
        })
    }
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/me/", get(me).patch(update_me))
        .route("/api/whoami/", get(whoami))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/health/", get(health_check))
        .route("/api/token/", post(obtain_token))
        .route("/api/token/refresh/", post(refresh_token))
        .route("/api/token/logout/", post(logout))
        .route("/api/register/", post(register))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);

    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service",
        "database": database,
    }))
}

fn issue_tokens(state: &AppState, user: &User) -> AuthResult<TokenResponse> {
    let pair = state.jwt_service.generate_pair(user.id)?;
    Ok(TokenResponse {
        access: pair.access,
        refresh: pair.refresh,
        user: UserResponse::from(user),
    })
}

/// Exchange email and password for an access/refresh pair
pub async fn obtain_token(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<TokenRequest>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);

    let mut errors = FieldErrors::new();
    if email.is_empty() {
        errors.add("email", "Email is required");
    }
    if payload.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.into_result().map_err(AuthError::Validation)?;

    info!("Login attempt for user: {}", email);

    let limiter_key = format!("login:{}", email);
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        warn!("Login rate limit exceeded for {}", email);
        return Err(AuthError::TooManyAttempts);
    }

    let Some(user) = state.user_repository.find_by_email(&email).await? else {
        verify_dummy_password(&payload.password);
        warn!("Login for unknown email {}", email);
        return Err(AuthError::Unauthorized("Invalid email or password"));
    };

    let valid = verify_password(&user.password_hash, &payload.password)
        .map_err(|e| AuthError::internal("Failed to verify password", e))?;
    if !valid {
        warn!("Invalid password for {}", email);
        return Err(AuthError::Unauthorized("Invalid email or password"));
    }

    state.rate_limiter.reset(&limiter_key).await;

    Ok((StatusCode::OK, Json(issue_tokens(&state, &user)?)))
}

/// Exchange a refresh token for a new access token
pub async fn refresh_token(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RefreshTokenRequest>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    info!("Token refresh request");

    if payload.refresh.is_empty() {
        return Err(AuthError::Validation(FieldErrors::single(
            "refresh",
            "Refresh token is required",
        )));
    }

    let claims = state
        .jwt_service
        .validate_typed(&payload.refresh, TokenType::Refresh)?;

    let revoked = state
        .token_blacklist
        .is_revoked(claims.jti)
        .await
        .map_err(|e| AuthError::internal("Failed to check token blacklist", e))?;
    if revoked {
        return Err(AuthError::Unauthorized("Token has been revoked"));
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthorized("User not found"))?;

    let access = state.jwt_service.generate_access_token(user.id)?;

    Ok((StatusCode::OK, Json(RefreshTokenResponse { access })))
}

/// Revoke a refresh token
pub async fn logout(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RefreshTokenRequest>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    info!("Logout request");

    let claims = state
        .jwt_service
        .validate_typed(&payload.refresh, TokenType::Refresh)?;

    state
        .token_blacklist
        .revoke(&claims)
        .await
        .map_err(|e| AuthError::internal("Failed to blacklist token", e))?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Register with email and password; the response logs the user in
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    let new_user = payload.validate().map_err(AuthError::Validation)?;

    let user = state.user_repository.create(&new_user).await?;
    let tokens = issue_tokens(&state, &user)?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

async fn load_current_user(state: &AppState, auth: AuthUser) -> AuthResult<User> {
    state
        .user_repository
        .find_by_id(auth.id)
        .await?
        .ok_or(AuthError::Unauthorized("User not found"))
}

/// Profile of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    let user = load_current_user(&state, auth).await?;
    Ok(Json(ProfileResponse::from(&user)))
}

/// Update first and last name of the authenticated user
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateProfile>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    let update = UpdateProfile {
        first_name: payload.first_name.map(|name| name.trim().to_string()),
        last_name: payload.last_name.map(|name| name.trim().to_string()),
    };

    let mut errors = FieldErrors::new();
    if let Some(first_name) = &update.first_name {
        errors.check("first_name", validate_name(first_name, FIRST_NAME_MAX));
    }
    if let Some(last_name) = &update.last_name {
        errors.check("last_name", validate_name(last_name, LAST_NAME_MAX));
    }
    errors.into_result().map_err(AuthError::Validation)?;

    let user = state
        .user_repository
        .update_profile(auth.id, &update)
        .await?;
    Ok(Json(ProfileResponse::from(&user)))
}

/// Identity behind the presented access token
pub async fn whoami(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    let user = load_current_user(&state, auth).await?;
    Ok(Json(UserResponse::from(&user)))
}
