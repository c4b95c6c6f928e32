use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::User;
use crate::services::jwt::{JwtService, TokenResponse};
use crate::services::session::SessionService;
use crate::services::tenant::{TenantContext, TenantResolver};
use crate::store::{TenantStore, UserStore};
use crate::utils::{verify_password, Password, PasswordHashString};

/// Authentication orchestration: login, refresh rotation, logout.
///
/// Every failure on the credential path collapses to
/// `ServiceError::Unauthenticated` at this boundary. The internal reason is
/// logged where it occurs and never reaches a caller. Infrastructure errors
/// (database, policy engine) propagate as themselves.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tenants: Arc<dyn TenantStore>,
    sessions: SessionService,
    resolver: TenantResolver,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tenants: Arc<dyn TenantStore>,
        sessions: SessionService,
        resolver: TenantResolver,
        jwt: JwtService,
    ) -> Self {
        Self {
            users,
            tenants,
            sessions,
            resolver,
            jwt,
        }
    }

    /// Authenticate with email and password within a resolved tenant.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &TenantContext,
        tenant_hint: Option<&str>,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<TokenResponse, ServiceError> {
        let tenant_id = self.resolver.resolve_tenant_id(ctx, tenant_hint).await?;

        let tenant = self
            .tenants
            .find_tenant_by_id(tenant_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        if !tenant.is_active {
            tracing::warn!(tenant_id = %tenant_id, "Login attempt against inactive tenant");
            return Err(ServiceError::Unauthenticated);
        }

        let Some(user) = self
            .users
            .find_user_by_email_in_tenant(tenant_id, email)
            .await?
        else {
            tracing::debug!(tenant_id = %tenant_id, "Login attempt for unknown email");
            return Err(ServiceError::Unauthenticated);
        };

        if !user.can_authenticate() {
            tracing::warn!(
                user_id = %user.user_id,
                tenant_id = %tenant_id,
                "Login attempt by inactive or unverified user"
            );
            return Err(ServiceError::Unauthenticated);
        }

        let candidate = Password::new(password.to_string());
        let stored = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&candidate, &stored) {
            tracing::debug!(user_id = %user.user_id, "Password verification failed");
            return Err(ServiceError::Unauthenticated);
        }

        let response = self.mint_session(&user, device_info, ip_address).await?;
        tracing::info!(user_id = %user.user_id, tenant_id = %tenant_id, "User logged in");
        Ok(response)
    }

    /// Rotate a refresh token: verify, invalidate the old session, mint a
    /// new pair. The invalidation is a conditional delete; when two callers
    /// race on the same token, exactly one wins and the loser is rejected.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<TokenResponse, ServiceError> {
        let claims = self.jwt.validate_refresh_token(refresh_token).map_err(|err| {
            tracing::debug!(error = %err, "Refresh token failed verification");
            ServiceError::Unauthenticated
        })?;

        let Some(session_id) = self
            .sessions
            .find_and_verify(claims.sub, claims.tenant_id, refresh_token)
            .await?
        else {
            tracing::debug!(
                user_id = %claims.sub,
                tenant_id = %claims.tenant_id,
                "Refresh token has no live session"
            );
            return Err(ServiceError::Unauthenticated);
        };

        // Linearization point: a replayed token loses here.
        let removed = self.sessions.revoke(session_id).await?;
        if removed == 0 {
            tracing::warn!(
                user_id = %claims.sub,
                tenant_id = %claims.tenant_id,
                "Concurrent refresh detected; rejecting the replay"
            );
            return Err(ServiceError::Unauthenticated);
        }

        let Some(user) = self.users.find_user_by_id(claims.sub).await? else {
            return Err(ServiceError::Unauthenticated);
        };
        if user.tenant_id != claims.tenant_id || !user.can_authenticate() {
            tracing::warn!(user_id = %user.user_id, "Refresh rejected for disabled user");
            return Err(ServiceError::Unauthenticated);
        }

        let response = self.mint_session(&user, device_info, ip_address).await?;
        tracing::info!(user_id = %user.user_id, tenant_id = %user.tenant_id, "Session rotated");
        Ok(response)
    }

    /// Revoke the session behind a refresh token. Idempotent: a token whose
    /// session is already gone (or that never verified) is a no-op.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ServiceError> {
        let Ok(claims) = self.jwt.validate_refresh_token(refresh_token) else {
            return Ok(());
        };

        if let Some(session_id) = self
            .sessions
            .find_and_verify(claims.sub, claims.tenant_id, refresh_token)
            .await?
        {
            self.sessions.revoke(session_id).await?;
            tracing::info!(user_id = %claims.sub, tenant_id = %claims.tenant_id, "User logged out");
        }
        Ok(())
    }

    /// Revoke every session for the user within the tenant. Returns the
    /// number of sessions revoked.
    pub async fn logout_all(&self, user_id: Uuid, tenant_id: Uuid) -> Result<u64, ServiceError> {
        let revoked = self.sessions.revoke_all(user_id, tenant_id).await?;
        tracing::info!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            revoked,
            "Revoked all sessions"
        );
        Ok(revoked)
    }

    async fn mint_session(
        &self,
        user: &User,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<TokenResponse, ServiceError> {
        let (access_token, refresh_token, _refresh_token_id) = self.jwt.generate_token_pair(
            user.user_id,
            user.tenant_id,
            &user.email,
            &user.role_name,
        )?;

        self.sessions
            .create(
                user.user_id,
                user.tenant_id,
                &refresh_token,
                device_info,
                ip_address,
                self.jwt.refresh_token_expires_at(),
            )
            .await?;
        self.sessions
            .cleanup_expired(user.user_id, user.tenant_id)
            .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::Tenant;
    use crate::store::memory::MemoryStore;
    use crate::utils::hash_password;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            access_token_secret: "test-access-secret".to_string(),
            refresh_token_secret: "test-refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    async fn fixture() -> (AuthService, Arc<MemoryStore>, Tenant, User) {
        let store = Arc::new(MemoryStore::new());

        let tenant = Tenant::new("default".to_string(), "Default Tenant".to_string());
        store.insert_tenant(&tenant).await.unwrap();

        let hash = hash_password(&Password::new("correct-horse".to_string())).unwrap();
        let mut user = User::new(
            tenant.tenant_id,
            "alice@example.com".to_string(),
            hash.into_string(),
            "admin".to_string(),
        );
        user.is_verified = true;
        store.insert_user(&user).await.unwrap();

        let jwt = JwtService::new(&jwt_config());
        let sessions = SessionService::new(store.clone(), 5);
        let resolver = TenantResolver::new(store.clone(), "default".to_string());
        let auth = AuthService::new(store.clone(), store.clone(), sessions, resolver, jwt);

        (auth, store, tenant, user)
    }

    #[tokio::test]
    async fn login_with_valid_credentials_issues_pair() {
        let (auth, _, _, _) = fixture().await;

        let response = auth
            .login(
                "alice@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                None,
                Some("cli".to_string()),
                None,
            )
            .await
            .unwrap();

        assert!(!response.access_token.is_empty());
        assert!(!response.refresh_token.is_empty());
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 15 * 60);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthenticated() {
        let (auth, _, _, _) = fixture().await;

        let err = auth
            .login(
                "alice@example.com",
                "wrong-password",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_unauthenticated() {
        let (auth, _, _, _) = fixture().await;

        let err = auth
            .login(
                "nobody@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn unverified_user_cannot_login() {
        let (auth, store, tenant, _) = fixture().await;

        let hash = hash_password(&Password::new("some-password".to_string())).unwrap();
        let unverified = User::new(
            tenant.tenant_id,
            "bob@example.com".to_string(),
            hash.into_string(),
            "viewer".to_string(),
        );
        store.insert_user(&unverified).await.unwrap();

        let err = auth
            .login(
                "bob@example.com",
                "some-password",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn same_email_resolves_per_tenant() {
        let (auth, store, _, _) = fixture().await;

        let other = Tenant::new("acme".to_string(), "Acme Corp".to_string());
        store.insert_tenant(&other).await.unwrap();

        let hash = hash_password(&Password::new("other-password".to_string())).unwrap();
        let mut twin = User::new(
            other.tenant_id,
            "alice@example.com".to_string(),
            hash.into_string(),
            "viewer".to_string(),
        );
        twin.is_verified = true;
        store.insert_user(&twin).await.unwrap();

        // The default-tenant alice's password does not work under acme.
        let err = auth
            .login(
                "alice@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                Some("acme"),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));

        // The acme alice's own password does.
        auth.login(
            "alice@example.com",
            "other-password",
            &TenantContext::unbound(),
            Some("acme"),
            None,
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn refresh_rotates_and_invalidates_old_token() {
        let (auth, _, _, _) = fixture().await;

        let first = auth
            .login(
                "alice@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let second = auth
            .refresh(&first.refresh_token, None, None)
            .await
            .unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        // The rotated-out token loses on replay.
        let err = auth
            .refresh(&first.refresh_token, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));

        // The new token still works.
        auth.refresh(&second.refresh_token, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_with_garbage_token_is_unauthenticated() {
        let (auth, _, _, _) = fixture().await;

        let err = auth.refresh("not-a-jwt", None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn logout_revokes_the_session_and_is_idempotent() {
        let (auth, _, _, _) = fixture().await;

        let response = auth
            .login(
                "alice@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        auth.logout(&response.refresh_token).await.unwrap();

        let err = auth
            .refresh(&response.refresh_token, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));

        // Logging out again (or with garbage) is a no-op.
        auth.logout(&response.refresh_token).await.unwrap();
        auth.logout("not-a-jwt").await.unwrap();
    }

    #[tokio::test]
    async fn logout_all_revokes_every_device() {
        let (auth, _, tenant, user) = fixture().await;

        let mut tokens = Vec::new();
        for device in ["laptop", "phone", "tablet"] {
            let response = auth
                .login(
                    "alice@example.com",
                    "correct-horse",
                    &TenantContext::unbound(),
                    None,
                    Some(device.to_string()),
                    None,
                )
                .await
                .unwrap();
            tokens.push(response.refresh_token);
        }

        let revoked = auth
            .logout_all(user.user_id, tenant.tenant_id)
            .await
            .unwrap();
        assert_eq!(revoked, 3);

        for token in tokens {
            let err = auth.refresh(&token, None, None).await.unwrap_err();
            assert!(matches!(err, ServiceError::Unauthenticated));
        }
    }

    #[tokio::test]
    async fn repeated_logins_stay_within_retention_cap() {
        let (auth, store, tenant, user) = fixture().await;

        for _ in 0..8 {
            auth.login(
                "alice@example.com",
                "correct-horse",
                &TenantContext::unbound(),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        }

        use crate::store::SessionStore as _;
        let live = store
            .find_valid_tokens(user.user_id, tenant.tenant_id)
            .await
            .unwrap();
        assert_eq!(live.len(), 5);
    }
}
