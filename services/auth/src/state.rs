//! Application state shared across handlers

use common::jwt::JwtService;
use sqlx::PgPool;

use crate::{blacklist::TokenBlacklist, rate_limiter::RateLimiter, repositories::UserRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub token_blacklist: TokenBlacklist,
    pub rate_limiter: RateLimiter,
}
