//! In-process store implementation.
//!
//! Mirrors the semantics of the PostgreSQL statements over mutex-guarded
//! collections. Used by the test suite and by embedders that want the auth
//! core without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Permission, RefreshToken, Role, Tenant, User};
use crate::store::{PolicyTuple, RbacStore, SessionStore, TenantStore, TokenProbe, UserStore};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tenants: Vec<Tenant>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    tokens: Vec<RefreshToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn find_user_by_email_in_tenant(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.tenant_id == tenant_id && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| {
            u.tenant_id == user.tenant_id && u.email.eq_ignore_ascii_case(&user.email)
        }) {
            return Err(ServiceError::Conflict("user already exists".to_string()));
        }
        inner.users.push(user.clone());
        Ok(())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tenants
            .iter()
            .find(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tenants.iter().find(|t| t.slug == slug).cloned())
    }

    async fn earliest_tenant(&self) -> Result<Option<Tenant>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tenants
            .iter()
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(ServiceError::Conflict("tenant already exists".to_string()));
        }
        inner.tenants.push(tenant.clone());
        Ok(())
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn find_role(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .roles
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn insert_role(&self, role: &Role) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .roles
            .iter()
            .any(|r| r.tenant_id == role.tenant_id && r.name == role.name)
        {
            return Err(ServiceError::Conflict("role already exists".to_string()));
        }
        inner.roles.push(role.clone());
        Ok(())
    }

    async fn find_permission(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .permissions
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.resource == resource && p.action == action)
            .cloned())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.permissions.iter().any(|p| {
            p.tenant_id == permission.tenant_id
                && p.resource == permission.resource
                && p.action == permission.action
        }) {
            return Err(ServiceError::Conflict(
                "permission already exists".to_string(),
            ));
        }
        inner.permissions.push(permission.clone());
        Ok(())
    }

    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.role_permissions.insert((role_id, permission_id)))
    }

    async fn unlink_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(u64::from(
            inner.role_permissions.remove(&(role_id, permission_id)),
        ))
    }

    async fn association_exists(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.role_permissions.contains(&(role_id, permission_id)))
    }

    async fn permissions_for_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        let mut permissions: Vec<Permission> = inner
            .permissions
            .iter()
            .filter(|p| {
                inner
                    .role_permissions
                    .contains(&(role_id, p.permission_id))
            })
            .cloned()
            .collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(permissions)
    }

    async fn all_associations(&self) -> Result<Vec<PolicyTuple>, ServiceError> {
        let inner = self.inner.lock().unwrap();
        let mut tuples = Vec::new();
        for (role_id, permission_id) in &inner.role_permissions {
            let role = inner.roles.iter().find(|r| r.role_id == *role_id);
            let permission = inner
                .permissions
                .iter()
                .find(|p| p.permission_id == *permission_id);
            if let (Some(role), Some(permission)) = (role, permission) {
                tuples.push(PolicyTuple {
                    role_name: role.name.clone(),
                    tenant_id: role.tenant_id,
                    resource: permission.resource.clone(),
                    action: permission.action.clone(),
                });
            }
        }
        tuples.sort_by(|a, b| {
            (a.tenant_id, &a.role_name, &a.resource, &a.action).cmp(&(
                b.tenant_id,
                &b.role_name,
                &b.resource,
                &b.action,
            ))
        });
        Ok(tuples)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), ServiceError> {
        self.inner.lock().unwrap().tokens.push(token.clone());
        Ok(())
    }

    async fn find_valid_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<TokenProbe>, ServiceError> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        let mut live: Vec<&RefreshToken> = inner
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.tenant_id == tenant_id && t.expires_at >= now)
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live
            .into_iter()
            .map(|t| TokenProbe {
                id: t.id,
                token_hash: t.token_hash.clone(),
                expires_at: t.expires_at,
            })
            .collect())
    }

    async fn update_token_hash(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.tokens.iter_mut().find(|t| t.id == id) {
            Some(token) => {
                token.token_hash = token_hash.to_string();
                token.expires_at = expires_at;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_token(&self, id: Uuid) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.id != id);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn delete_all_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|t| !(t.user_id == user_id && t.tenant_id == tenant_id));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn delete_expired_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| {
            !(t.user_id == user_id && t.tenant_id == tenant_id && t.expires_at < now)
        });
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn enforce_retention(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        keep: i64,
    ) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();

        let mut live: Vec<(Uuid, DateTime<Utc>)> = inner
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.tenant_id == tenant_id && t.expires_at >= now)
            .map(|t| (t.id, t.created_at))
            .collect();
        live.sort_by(|a, b| b.1.cmp(&a.1));
        let kept: HashSet<Uuid> = live
            .into_iter()
            .take(keep.max(0) as usize)
            .map(|(id, _)| id)
            .collect();

        let before = inner.tokens.len();
        inner.tokens.retain(|t| {
            !(t.user_id == user_id && t.tenant_id == tenant_id) || kept.contains(&t.id)
        });
        Ok((before - inner.tokens.len()) as u64)
    }
}
