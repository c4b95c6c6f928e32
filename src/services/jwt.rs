use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Why a token failed verification. Distinguished internally for logging;
/// the auth boundary collapses all three into the generic authentication
/// failure before anything reaches a caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature or claims invalid")]
    Invalid,
    #[error("token structure malformed")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            _ => TokenError::Invalid,
        }
    }
}

/// JWT service for token generation and validation.
///
/// Access and refresh tokens are signed with distinct secrets so an
/// access-secret compromise does not grant long-lived access.
#[derive(Clone)]
pub struct JwtService {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived). Never persisted; verified
/// cryptographically on each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Tenant the session is bound to
    pub tenant_id: Uuid,
    /// Role label within the tenant
    pub role: String,
    /// Email
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Tenant the session is bound to
    pub tenant_id: Uuid,
    /// Token ID
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token pair returned to the client.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding_key: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding_key: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding_key: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Generate an access token for a user session.
    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user_id,
            tenant_id,
            role: role.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.access_encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Generate a refresh token bound to a user and tenant.
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        token_id: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            sub: user_id,
            tenant_id,
            jti: token_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.refresh_encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    /// Generate both access and refresh tokens. Returns
    /// (access_token, refresh_token, refresh_token_id).
    pub fn generate_token_pair(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: &str,
    ) -> Result<(String, String, String), anyhow::Error> {
        let access_token = self.generate_access_token(user_id, tenant_id, email, role)?;
        let refresh_token_id = Uuid::new_v4().to_string();
        let refresh_token =
            self.generate_refresh_token(user_id, tenant_id, &refresh_token_id)?;

        Ok((access_token, refresh_token, refresh_token_id))
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let validation = strict_validation();
        let token_data =
            decode::<AccessTokenClaims>(token, &self.access_decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        let validation = strict_validation();
        let token_data =
            decode::<RefreshTokenClaims>(token, &self.refresh_decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }

    /// Expiry timestamp a refresh token minted now will carry.
    pub fn refresh_token_expires_at(&self) -> chrono::DateTime<Utc> {
        Utc::now() + Duration::days(self.refresh_token_expiry_days)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    // No leeway: a token is rejected the moment its lifetime elapses.
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_token_secret: "test-access-secret".to_string(),
            refresh_token_secret: "test-refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let token = service
            .generate_access_token(user_id, tenant_id, "test@example.com", "admin")
            .unwrap();
        assert!(!token.is_empty());

        let claims = service.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant_id, tenant_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let token = service
            .generate_refresh_token(user_id, tenant_id, "token_abc")
            .unwrap();

        let claims = service.validate_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant_id, tenant_id);
        assert_eq!(claims.jti, "token_abc");
    }

    #[test]
    fn test_token_pair_generation() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let (access_token, refresh_token, refresh_token_id) = service
            .generate_token_pair(user_id, tenant_id, "test@example.com", "admin")
            .unwrap();

        let access_claims = service.validate_access_token(&access_token).unwrap();
        assert_eq!(access_claims.sub, user_id);

        let refresh_claims = service.validate_refresh_token(&refresh_token).unwrap();
        assert_eq!(refresh_claims.jti, refresh_token_id);
    }

    #[test]
    fn test_expired_token_is_rejected_as_expired() {
        let mut config = test_config();
        config.access_token_expiry_minutes = -1;
        let service = JwtService::new(&config);

        let token = service
            .generate_access_token(Uuid::new_v4(), Uuid::new_v4(), "a@x.com", "admin")
            .unwrap();

        assert_eq!(
            service.validate_access_token(&token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected_as_invalid() {
        let service = JwtService::new(&test_config());

        let mut other_config = test_config();
        other_config.access_token_secret = "a-different-secret".to_string();
        let other = JwtService::new(&other_config);

        let token = service
            .generate_access_token(Uuid::new_v4(), Uuid::new_v4(), "a@x.com", "admin")
            .unwrap();

        assert_eq!(
            other.validate_access_token(&token).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn test_access_verifier_rejects_refresh_token() {
        // Distinct secrets per token class: a refresh token must not pass
        // access-token verification.
        let service = JwtService::new(&test_config());

        let refresh_token = service
            .generate_refresh_token(Uuid::new_v4(), Uuid::new_v4(), "token_abc")
            .unwrap();

        assert!(service.validate_access_token(&refresh_token).is_err());
    }

    #[test]
    fn test_garbage_is_rejected_as_malformed() {
        let service = JwtService::new(&test_config());

        assert_eq!(
            service.validate_access_token("not-a-jwt").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_token_response_serializes_bearer() {
        let response = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 900);
    }
}
