//! Refresh-token revocation backed by Redis

use anyhow::Result;
use common::{cache::RedisPool, jwt::Claims};
use tracing::info;
use uuid::Uuid;

/// Revoked refresh tokens, keyed by their `jti`
#[derive(Clone)]
pub struct TokenBlacklist {
    redis_pool: RedisPool,
}

impl TokenBlacklist {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    fn key(jti: Uuid) -> String {
        format!("blacklisted_token:{}", jti)
    }

    /// Revoke the token for the rest of its lifetime
    pub async fn revoke(&self, claims: &Claims) -> Result<()> {
        let ttl = claims.remaining_lifetime()?;
        if ttl == 0 {
            return Ok(());
        }

        self.redis_pool
            .set(&Self::key(claims.jti), "1", Some(ttl))
            .await?;
        info!("Revoked refresh token {} of user {}", claims.jti, claims.sub);
        Ok(())
    }

    /// Check if a token has been revoked
    pub async fn is_revoked(&self, jti: Uuid) -> Result<bool> {
        self.redis_pool.exists(&Self::key(jti)).await
    }
}
