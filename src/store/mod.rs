//! Store interfaces for the relational collaborators.
//!
//! Every method takes the tenant id explicitly where tenant scoping applies;
//! there is no ambient tenant state anywhere in the crate.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Permission, RefreshToken, Role, Tenant, User};

/// Narrow projection returned by validity-scoped token lookups. Bulk reads
/// never expose device or address metadata.
#[derive(Debug, Clone, FromRow)]
pub struct TokenProbe {
    pub id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// One role-permission association flattened to the policy engine's tuple
/// shape, used for rebuild and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct PolicyTuple {
    pub role_name: String,
    pub tenant_id: Uuid,
    pub resource: String,
    pub action: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_email_in_tenant(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, ServiceError>;

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, ServiceError>;

    /// The earliest-created tenant, the last-resort resolution fallback.
    async fn earliest_tenant(&self) -> Result<Option<Tenant>, ServiceError>;

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn find_role(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>, ServiceError>;

    async fn insert_role(&self, role: &Role) -> Result<(), ServiceError>;

    async fn find_permission(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<Option<Permission>, ServiceError>;

    async fn insert_permission(&self, permission: &Permission) -> Result<(), ServiceError>;

    /// Associate a permission with a role. Returns `false` when the
    /// association already existed (idempotent).
    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError>;

    /// Remove an association; returns the number of rows removed.
    async fn unlink_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, ServiceError>;

    async fn association_exists(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError>;

    async fn permissions_for_role(&self, role_id: Uuid)
        -> Result<Vec<Permission>, ServiceError>;

    /// Every role-permission association in the system, flattened to policy
    /// tuples.
    async fn all_associations(&self) -> Result<Vec<PolicyTuple>, ServiceError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Always inserts a new row; concurrent multi-device sessions each get
    /// their own record.
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), ServiceError>;

    /// All not-yet-expired tokens for the (user, tenant) pair.
    async fn find_valid_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<TokenProbe>, ServiceError>;

    /// Replace the opaque value without changing row identity. Returns the
    /// affected-row count.
    async fn update_token_hash(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;

    /// Delete one token. The affected-row count is the arbiter for
    /// concurrent rotation: only one caller observes `1`.
    async fn delete_token(&self, id: Uuid) -> Result<u64, ServiceError>;

    async fn delete_all_tokens(&self, user_id: Uuid, tenant_id: Uuid)
        -> Result<u64, ServiceError>;

    async fn delete_expired_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError>;

    /// Delete all but the `keep` most-recently-created live tokens.
    async fn enforce_retention(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        keep: i64,
    ) -> Result<u64, ServiceError>;
}
