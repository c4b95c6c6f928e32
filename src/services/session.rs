use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::RefreshToken;
use crate::store::SessionStore;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Refresh-token session service.
///
/// Tokens are stored as salted argon2 hashes, so there is no lookup key
/// derived from the plaintext: verification scans the live tokens for the
/// (user, tenant) pair and compares each. The scan stays cheap because the
/// retention cap bounds live tokens per user.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    retention: i64,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, retention: i64) -> Self {
        Self { store, retention }
    }

    /// Persist a new hashed session. Always inserts; each device gets its
    /// own row.
    pub async fn create(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        plaintext_token: &str,
        device_info: Option<String>,
        ip_address: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, ServiceError> {
        let hash = hash_password(&Password::new(plaintext_token.to_string()))?;
        let record = RefreshToken::new(
            user_id,
            tenant_id,
            hash.into_string(),
            device_info,
            ip_address,
            expires_at,
        );
        self.store.insert_token(&record).await?;
        Ok(record)
    }

    /// Locate the session matching a plaintext token, if any.
    ///
    /// Linear scan over the not-yet-expired tokens for the pair, comparing
    /// with the one-way hash. `None` means "no session" and is not an error.
    pub async fn find_and_verify(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        plaintext_token: &str,
    ) -> Result<Option<Uuid>, ServiceError> {
        let probes = self.store.find_valid_tokens(user_id, tenant_id).await?;
        let candidate = Password::new(plaintext_token.to_string());

        for probe in probes {
            let stored = PasswordHashString::new(probe.token_hash);
            if verify_password(&candidate, &stored) {
                return Ok(Some(probe.id));
            }
        }

        Ok(None)
    }

    /// Replace the opaque value of an existing session without changing row
    /// identity.
    pub async fn update(
        &self,
        token_id: Uuid,
        plaintext_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let hash = hash_password(&Password::new(plaintext_token.to_string()))?;
        self.store
            .update_token_hash(token_id, hash.as_str(), expires_at)
            .await
    }

    /// Revoke one session. The returned count is the rotation arbiter:
    /// concurrent callers racing on the same token see `1` exactly once.
    pub async fn revoke(&self, token_id: Uuid) -> Result<u64, ServiceError> {
        self.store.delete_token(token_id).await
    }

    /// Revoke every session for the (user, tenant) pair.
    pub async fn revoke_all(&self, user_id: Uuid, tenant_id: Uuid) -> Result<u64, ServiceError> {
        self.store.delete_all_tokens(user_id, tenant_id).await
    }

    /// Delete expired sessions, then cap the live ones at the configured
    /// retention (most recent first). Bounds growth from repeated logins
    /// without explicit logout.
    pub async fn cleanup_expired(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let expired = self.store.delete_expired_tokens(user_id, tenant_id).await?;
        let surplus = self
            .store
            .enforce_retention(user_id, tenant_id, self.retention)
            .await?;
        if expired + surplus > 0 {
            tracing::debug!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                expired,
                surplus,
                "Pruned refresh tokens"
            );
        }
        Ok(expired + surplus)
    }
}
