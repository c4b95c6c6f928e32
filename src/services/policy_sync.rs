use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Permission, Role};
use crate::services::authz::PolicyEngine;
use crate::store::{PolicyTuple, RbacStore};

/// Difference between the relational associations and the loaded engine
/// tuples. Empty on both sides means the two views agree.
#[derive(Debug, Default)]
pub struct DriftReport {
    /// Relational associations with no matching engine tuple.
    pub missing_in_engine: Vec<PolicyTuple>,
    /// Engine tuples with no relational association backing them.
    pub missing_in_relational: Vec<PolicyTuple>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_in_engine.is_empty() && self.missing_in_relational.is_empty()
    }
}

/// Keeps the relational role/permission tables and the in-memory engine in
/// step. The relational store is the source of truth; the engine is a
/// derived view that can always be rebuilt from it.
#[derive(Clone)]
pub struct PolicySync {
    rbac: Arc<dyn RbacStore>,
    engine: PolicyEngine,
}

impl PolicySync {
    pub fn new(rbac: Arc<dyn RbacStore>, engine: PolicyEngine) -> Self {
        Self { rbac, engine }
    }

    /// Grant (resource, action) to a role within a tenant.
    ///
    /// The permission record is created on first use and reused afterwards;
    /// redefining its description is a `Conflict`. Granting an
    /// already-granted permission is a no-op, not an error.
    /// Writes the relational association first, then the engine tuple; an
    /// engine failure after a relational write is surfaced as drift, not
    /// rolled back.
    pub async fn grant(
        &self,
        role_name: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
        description: Option<String>,
    ) -> Result<Permission, ServiceError> {
        let role = self.require_role(tenant_id, role_name).await?;
        let permission = self
            .find_or_create_permission(tenant_id, resource, action, description)
            .await?;

        let linked = self
            .rbac
            .link_role_permission(role.role_id, permission.permission_id)
            .await?;

        let loaded = self
            .engine
            .add_policy(role_name, tenant_id, resource, action)
            .await;
        match loaded {
            Ok(_) => {}
            Err(err) => {
                // Relational write already landed; the engine is now behind
                // until the next rebuild.
                tracing::error!(
                    role = %role_name,
                    tenant_id = %tenant_id,
                    resource = %resource,
                    action = %action,
                    error = %err,
                    "Policy engine rejected grant; views have drifted"
                );
                return Err(err);
            }
        }

        if linked {
            tracing::info!(
                role = %role_name,
                tenant_id = %tenant_id,
                resource = %resource,
                action = %action,
                "Granted permission to role"
            );
        }
        Ok(permission)
    }

    /// Revoke (resource, action) from a role within a tenant.
    ///
    /// The relational association decides whether the grant exists; a
    /// missing association is an error even if the engine still carries a
    /// stale tuple. The permission record itself is kept for reuse.
    pub async fn revoke(
        &self,
        role_name: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<(), ServiceError> {
        let role = self.require_role(tenant_id, role_name).await?;
        let permission = self
            .rbac
            .find_permission(tenant_id, resource, action)
            .await?
            .ok_or_else(|| ServiceError::NotFound("permission not granted".to_string()))?;

        let exists = self
            .rbac
            .association_exists(role.role_id, permission.permission_id)
            .await?;
        if !exists {
            if self
                .engine
                .has_policy(role_name, tenant_id, resource, action)
                .await
            {
                tracing::warn!(
                    role = %role_name,
                    tenant_id = %tenant_id,
                    resource = %resource,
                    action = %action,
                    "Engine carries a tuple with no relational association"
                );
            }
            return Err(ServiceError::NotFound(
                "permission not granted".to_string(),
            ));
        }

        self.rbac
            .unlink_role_permission(role.role_id, permission.permission_id)
            .await?;
        let removed = self
            .engine
            .remove_policy(role_name, tenant_id, resource, action)
            .await?;
        if !removed {
            tracing::warn!(
                role = %role_name,
                tenant_id = %tenant_id,
                resource = %resource,
                action = %action,
                "Engine had no tuple for a revoked association"
            );
        }

        tracing::info!(
            role = %role_name,
            tenant_id = %tenant_id,
            resource = %resource,
            action = %action,
            "Revoked permission from role"
        );
        Ok(())
    }

    /// Bind a user subject to a role within a tenant, in both views.
    pub async fn assign_role(
        &self,
        subject: &str,
        role_name: &str,
        tenant_id: Uuid,
    ) -> Result<bool, ServiceError> {
        self.require_role(tenant_id, role_name).await?;
        self.engine
            .add_role_for_user(subject, role_name, tenant_id)
            .await
    }

    /// Subjects currently bound to a role within a tenant.
    pub async fn users_for_role(&self, role_name: &str, tenant_id: Uuid) -> Vec<String> {
        self.engine.users_for_role(role_name, tenant_id).await
    }

    /// Discard the engine's tuples and reload every relational association.
    /// Returns the number of tuples loaded.
    pub async fn rebuild(&self) -> Result<usize, ServiceError> {
        self.engine.clear().await?;

        let associations = self.rbac.all_associations().await?;
        let count = associations.len();
        for tuple in associations {
            self.engine
                .add_policy(
                    &tuple.role_name,
                    tuple.tenant_id,
                    &tuple.resource,
                    &tuple.action,
                )
                .await?;
        }

        tracing::info!(tuples = count, "Rebuilt policy engine from store");
        Ok(count)
    }

    /// Compare the two views without modifying either.
    pub async fn reconcile(&self) -> Result<DriftReport, ServiceError> {
        let relational: HashSet<PolicyTuple> =
            self.rbac.all_associations().await?.into_iter().collect();

        let engine: HashSet<PolicyTuple> = self
            .engine
            .policies()
            .await
            .into_iter()
            .filter_map(|rule| {
                let [role_name, tenant, resource, action]: [String; 4] = rule.try_into().ok()?;
                Some(PolicyTuple {
                    role_name,
                    tenant_id: tenant.parse().ok()?,
                    resource,
                    action,
                })
            })
            .collect();

        let report = DriftReport {
            missing_in_engine: relational.difference(&engine).cloned().collect(),
            missing_in_relational: engine.difference(&relational).cloned().collect(),
        };

        if !report.is_clean() {
            tracing::warn!(
                missing_in_engine = report.missing_in_engine.len(),
                missing_in_relational = report.missing_in_relational.len(),
                "Policy views have drifted"
            );
        }
        Ok(report)
    }

    /// A deactivated role cannot take new grants, revocations, or bindings.
    async fn require_role(&self, tenant_id: Uuid, role_name: &str) -> Result<Role, ServiceError> {
        let role = self
            .rbac
            .find_role(tenant_id, role_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("role '{}' not found", role_name)))?;
        if !role.is_active {
            return Err(ServiceError::NotFound(format!(
                "role '{}' is inactive",
                role_name
            )));
        }
        Ok(role)
    }

    /// Reuse the existing permission record when one matches. A caller that
    /// supplies a description disagreeing with the stored one is redefining
    /// the permission, which is a conflict; `None` means "no opinion" and
    /// always reuses.
    async fn find_or_create_permission(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
        description: Option<String>,
    ) -> Result<Permission, ServiceError> {
        if let Some(existing) = self.rbac.find_permission(tenant_id, resource, action).await? {
            if let Some(ref wanted) = description {
                if existing.description.as_deref() != Some(wanted.as_str()) {
                    return Err(ServiceError::Conflict(format!(
                        "permission ({}, {}) already exists with a different description",
                        resource, action
                    )));
                }
            }
            return Ok(existing);
        }
        let permission = Permission::new(
            tenant_id,
            resource.to_string(),
            action.to_string(),
            description,
        );
        self.rbac.insert_permission(&permission).await?;
        Ok(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    async fn fixture() -> (PolicySync, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let engine = PolicyEngine::new().await.unwrap();
        let tenant_id = Uuid::new_v4();

        let role = Role::new(tenant_id, "editor".to_string());
        store.insert_role(&role).await.unwrap();

        (
            PolicySync::new(store.clone(), engine),
            store,
            tenant_id,
        )
    }

    #[tokio::test]
    async fn grant_writes_both_views() {
        let (sync, store, tenant_id) = fixture().await;

        sync.grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();

        assert!(sync
            .engine
            .enforce("editor", tenant_id, "documents", "write")
            .await
            .unwrap());
        assert!(store
            .find_permission(tenant_id, "documents", "write")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn grant_is_idempotent_and_reuses_permission() {
        let (sync, _, tenant_id) = fixture().await;

        let first = sync
            .grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();
        let second = sync
            .grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();

        assert_eq!(first.permission_id, second.permission_id);
    }

    #[tokio::test]
    async fn grant_with_conflicting_description_is_rejected() {
        let (sync, _, tenant_id) = fixture().await;

        sync.grant(
            "editor",
            tenant_id,
            "documents",
            "write",
            Some("original meaning".to_string()),
        )
        .await
        .unwrap();

        let err = sync
            .grant(
                "editor",
                tenant_id,
                "documents",
                "write",
                Some("contradictory meaning".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // The same description, or no description at all, reuses the record.
        let same = sync
            .grant(
                "editor",
                tenant_id,
                "documents",
                "write",
                Some("original meaning".to_string()),
            )
            .await
            .unwrap();
        let agnostic = sync
            .grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();
        assert_eq!(same.permission_id, agnostic.permission_id);
        assert_eq!(agnostic.description.as_deref(), Some("original meaning"));
    }

    #[tokio::test]
    async fn grant_to_inactive_role_fails() {
        let (sync, store, tenant_id) = fixture().await;

        let mut dormant = Role::new(tenant_id, "dormant".to_string());
        dormant.is_active = false;
        store.insert_role(&dormant).await.unwrap();

        let err = sync
            .grant("dormant", tenant_id, "documents", "write", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = sync
            .assign_role("user:bob", "dormant", tenant_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn grant_to_missing_role_fails() {
        let (sync, _, tenant_id) = fixture().await;

        let err = sync
            .grant("nonexistent", tenant_id, "documents", "write", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn revoke_removes_both_views_and_keeps_permission_record() {
        let (sync, store, tenant_id) = fixture().await;

        sync.grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();
        sync.revoke("editor", tenant_id, "documents", "write")
            .await
            .unwrap();

        assert!(!sync
            .engine
            .enforce("editor", tenant_id, "documents", "write")
            .await
            .unwrap());
        // The permission definition survives for later grants.
        assert!(store
            .find_permission(tenant_id, "documents", "write")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn revoke_of_ungranted_permission_fails() {
        let (sync, _, tenant_id) = fixture().await;

        let err = sync
            .revoke("editor", tenant_id, "documents", "write")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn rebuild_restores_engine_from_store() {
        let (sync, _, tenant_id) = fixture().await;

        sync.grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();
        sync.grant("editor", tenant_id, "documents", "read", None)
            .await
            .unwrap();

        // Simulate engine loss (restart).
        sync.engine.clear().await.unwrap();
        assert!(!sync
            .engine
            .enforce("editor", tenant_id, "documents", "write")
            .await
            .unwrap());

        let loaded = sync.rebuild().await.unwrap();
        assert_eq!(loaded, 2);
        assert!(sync
            .engine
            .enforce("editor", tenant_id, "documents", "write")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn reconcile_reports_drift_in_both_directions() {
        let (sync, store, tenant_id) = fixture().await;

        sync.grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();

        // Engine-only tuple.
        sync.engine
            .add_policy("editor", tenant_id, "reports", "read")
            .await
            .unwrap();
        // Relational-only association.
        let permission = Permission::new(
            tenant_id,
            "invoices".to_string(),
            "read".to_string(),
            None,
        );
        store.insert_permission(&permission).await.unwrap();
        let role = store.find_role(tenant_id, "editor").await.unwrap().unwrap();
        store
            .link_role_permission(role.role_id, permission.permission_id)
            .await
            .unwrap();

        let report = sync.reconcile().await.unwrap();
        assert_eq!(report.missing_in_engine.len(), 1);
        assert_eq!(report.missing_in_engine[0].resource, "invoices");
        assert_eq!(report.missing_in_relational.len(), 1);
        assert_eq!(report.missing_in_relational[0].resource, "reports");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn assign_role_binds_subject_in_engine() {
        let (sync, _, tenant_id) = fixture().await;

        sync.grant("editor", tenant_id, "documents", "write", None)
            .await
            .unwrap();
        sync.assign_role("user:bob", "editor", tenant_id)
            .await
            .unwrap();

        assert!(sync
            .engine
            .enforce("user:bob", tenant_id, "documents", "write")
            .await
            .unwrap());
        assert_eq!(
            sync.users_for_role("editor", tenant_id).await,
            vec!["user:bob".to_string()]
        );
    }
}
