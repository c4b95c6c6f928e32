//! Refresh token model - one row per live session (multi-device).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted refresh token. `token_hash` holds a salted argon2 hash of the
/// opaque token; the plaintext is never stored and the hash is not usable as
/// a lookup key (verification scans the live tokens for the user/tenant).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Create a new refresh token record.
    pub fn new(
        user_id: Uuid,
        tenant_id: Uuid,
        token_hash: String,
        device_info: Option<String>,
        ip_address: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            token_hash,
            device_info,
            ip_address,
            expires_at,
            created_at: Utc::now(),
        }
    }

    /// Check if this token is past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_token_is_not_expired() {
        let token = RefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hash".to_string(),
            Some("cli".to_string()),
            None,
            Utc::now() + Duration::days(7),
        );
        assert!(!token.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let mut token = RefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hash".to_string(),
            None,
            None,
            Utc::now() + Duration::days(7),
        );
        token.expires_at = Utc::now() - Duration::seconds(1);
        assert!(token.is_expired());
    }

    #[test]
    fn serialized_token_omits_hash() {
        let token = RefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "$argon2id$secret".to_string(),
            None,
            None,
            Utc::now(),
        );
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
