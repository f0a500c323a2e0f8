//! JWT service for token generation and validation
//!
//! Tokens are signed with RS256. The auth service holds both keys and issues
//! access/refresh pairs; the api service only holds the public key and
//! verifies access tokens.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while issuing or validating tokens
#[derive(Error, Debug)]
pub enum TokenError {
    /// The token's `exp` is in the past
    #[error("Token has expired")]
    Expired,

    /// Bad signature, malformed token, unknown claims
    #[error("Invalid token")]
    Invalid,

    /// A refresh token was used where an access token is expected, or vice versa
    #[error("Unexpected token type")]
    WrongType,

    /// This service was configured without a private key
    #[error("Token signing is not configured")]
    SigningUnavailable,

    /// Key material could not be loaded
    #[error("Key error: {0}")]
    Key(String),

    /// System clock before the Unix epoch
    #[error("Failed to get current time: {0}")]
    Clock(String),

    /// Encoding failed
    #[error("Failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens; absent for verify-only services
    pub private_key: Option<String>,
    /// Public key for verifying tokens
    pub public_key: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: Private key (PEM) or path to the key file; optional
    /// - `JWT_PUBLIC_KEY`: Public key (PEM) or path to the key file
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self, TokenError> {
        let private_key = match std::env::var("JWT_PRIVATE_KEY") {
            Ok(value) => Some(read_pem(&value)?),
            Err(_) => None,
        };

        let public_key = std::env::var("JWT_PUBLIC_KEY")
            .map_err(|_| TokenError::Key("JWT_PUBLIC_KEY environment variable not set".into()))?;
        let public_key = read_pem(&public_key)?;

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(604_800);

        Ok(JwtConfig {
            private_key,
            public_key,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// Accept either inline PEM or a path to a PEM file
fn read_pem(value: &str) -> Result<String, TokenError> {
    if value.trim_start().starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    std::fs::read_to_string(value)
        .map(|pem| pem.trim().to_string())
        .map_err(|e| TokenError::Key(format!("Failed to read key file {}: {}", value, e)))
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Token ID, the revocation key for refresh tokens
    pub jti: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

impl Claims {
    /// Seconds until this token expires, zero if already past
    pub fn remaining_lifetime(&self) -> Result<u64, TokenError> {
        Ok(self.exp.saturating_sub(unix_now()?))
    }
}

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_expiry: u64,
    refresh_token_expiry: u64,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self, TokenError> {
        let encoding_key = config
            .private_key
            .as_deref()
            .map(|pem| EncodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())
            .map_err(|e| TokenError::Key(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(JwtService {
            encoding_key,
            decoding_key,
            validation,
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
        })
    }

    /// Whether this instance can issue tokens
    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, TokenType::Access, unix_now()?)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, TokenType::Refresh, unix_now()?)
    }

    /// Generate both tokens at once
    pub fn generate_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.generate_access_token(user_id)?,
            refresh: self.generate_refresh_token(user_id)?,
        })
    }

    fn issue(&self, user_id: Uuid, token_type: TokenType, now: u64) -> Result<String, TokenError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or(TokenError::SigningUnavailable)?;

        let lifetime = match token_type {
            TokenType::Access => self.access_token_expiry,
            TokenType::Refresh => self.refresh_token_expiry,
        };

        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + lifetime,
            token_type,
        };

        encode(&Header::new(Algorithm::RS256), &claims, key).map_err(TokenError::Encoding)
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Validate a token and require it to be of the given type
    pub fn validate_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.access_token_expiry
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.refresh_token_expiry
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TokenError::Clock(e.to_string()))
}

/// PEM fixtures shared by the test suites of both services
#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use super::{JwtConfig, JwtService};

    pub const PRIVATE_KEY: &str = include_str!("../testdata/jwt_private.pem");
    pub const PUBLIC_KEY: &str = include_str!("../testdata/jwt_public.pem");
    pub const OTHER_PUBLIC_KEY: &str = include_str!("../testdata/other_public.pem");

    pub fn config() -> JwtConfig {
        JwtConfig {
            private_key: Some(PRIVATE_KEY.to_string()),
            public_key: PUBLIC_KEY.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        }
    }

    /// Signing service built from the fixture keys
    pub fn service() -> JwtService {
        JwtService::new(config()).expect("fixture keys are valid")
    }

    /// Verify-only service built from the fixture public key
    pub fn verifier() -> JwtService {
        JwtService::new(JwtConfig {
            private_key: None,
            ..config()
        })
        .expect("fixture keys are valid")
    }

    /// Refresh token whose expiry is already `seconds_ago` in the past
    pub fn expired_refresh_token(user_id: uuid::Uuid, seconds_ago: u64) -> String {
        let service = service();
        let now = super::unix_now().expect("clock after epoch");
        let issued = now - service.refresh_token_expiry - seconds_ago;
        service
            .issue(user_id, super::TokenType::Refresh, issued)
            .expect("fixture signing works")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips_subject() {
        let service = testing::service();
        let user_id = Uuid::new_v4();

        let token = service.generate_access_token(user_id).unwrap();
        let claims = service.validate_typed(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn pair_tokens_have_distinct_ids_and_types() {
        let service = testing::service();
        let pair = service.generate_pair(Uuid::new_v4()).unwrap();

        let access = service.validate_token(&pair.access).unwrap();
        let refresh = service.validate_token(&pair.refresh).unwrap();

        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_ne!(access.jti, refresh.jti);
        assert_eq!(refresh.exp - refresh.iat, 604_800);
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let service = testing::service();
        let token = testing::expired_refresh_token(Uuid::new_v4(), 5);

        assert!(matches!(
            service.validate_typed(&token, TokenType::Refresh),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let service = testing::service();
        let token = service.generate_refresh_token(Uuid::new_v4()).unwrap();

        assert!(matches!(
            service.validate_typed(&token, TokenType::Access),
            Err(TokenError::WrongType)
        ));
    }

    #[test]
    fn token_signed_by_another_key_is_invalid() {
        let service = testing::service();
        let stranger = JwtService::new(JwtConfig {
            private_key: None,
            public_key: testing::OTHER_PUBLIC_KEY.to_string(),
            ..testing::config()
        })
        .unwrap();

        let token = service.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(matches!(
            stranger.validate_token(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        let service = testing::service();
        assert!(matches!(
            service.validate_token("not.a.jwt"),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn verifier_cannot_sign_but_can_validate() {
        let issuer = testing::service();
        let verifier = testing::verifier();
        assert!(!verifier.can_sign());

        let token = issuer.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(verifier.validate_token(&token).is_ok());
        assert!(matches!(
            verifier.generate_access_token(Uuid::new_v4()),
            Err(TokenError::SigningUnavailable)
        ));
    }

    #[test]
    fn remaining_lifetime_saturates_at_zero() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: 0,
            exp: 10,
            token_type: TokenType::Refresh,
        };
        assert_eq!(claims.remaining_lifetime().unwrap(), 0);
    }

    #[test]
    fn inline_pem_is_used_verbatim() {
        assert_eq!(
            read_pem(testing::PUBLIC_KEY).unwrap(),
            testing::PUBLIC_KEY.to_string()
        );
        assert!(matches!(
            read_pem("/definitely/not/here.pem"),
            Err(TokenError::Key(_))
        ));
    }
}
