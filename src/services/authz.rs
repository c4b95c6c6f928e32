use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi, RbacApi};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::store::RbacStore;

/// RBAC-with-domains model. The domain slot carries the tenant id, and the
/// matcher requires strict domain equality, so a role granted in one tenant
/// can never authorize a request in another.
const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (g(r.sub, p.sub, r.dom) || r.sub == p.sub) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
"#;

/// In-process policy engine. Checks run against in-memory state only; no
/// store round-trip sits on the enforcement path.
#[derive(Clone)]
pub struct PolicyEngine {
    enforcer: Arc<RwLock<Enforcer>>,
}

impl PolicyEngine {
    pub async fn new() -> Result<Self, ServiceError> {
        let model = DefaultModel::from_str(RBAC_MODEL).await?;
        let adapter = MemoryAdapter::default();
        let enforcer = Enforcer::new(model, adapter).await?;
        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
        })
    }

    /// Is `subject` allowed `action` on `resource` within the tenant?
    pub async fn enforce(
        &self,
        subject: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, ServiceError> {
        let enforcer = self.enforcer.read().await;
        let allowed = enforcer.enforce((subject, tenant_id.to_string(), resource, action))?;
        Ok(allowed)
    }

    /// Add a p-tuple. Returns false when the tuple already existed.
    pub async fn add_policy(
        &self,
        role_name: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, ServiceError> {
        let mut enforcer = self.enforcer.write().await;
        let added = enforcer
            .add_policy(vec![
                role_name.to_string(),
                tenant_id.to_string(),
                resource.to_string(),
                action.to_string(),
            ])
            .await?;
        Ok(added)
    }

    /// Remove a p-tuple. Returns false when the tuple was not present.
    pub async fn remove_policy(
        &self,
        role_name: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, ServiceError> {
        let mut enforcer = self.enforcer.write().await;
        let removed = enforcer
            .remove_policy(vec![
                role_name.to_string(),
                tenant_id.to_string(),
                resource.to_string(),
                action.to_string(),
            ])
            .await?;
        Ok(removed)
    }

    pub async fn has_policy(
        &self,
        role_name: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> bool {
        let enforcer = self.enforcer.read().await;
        enforcer.has_policy(vec![
            role_name.to_string(),
            tenant_id.to_string(),
            resource.to_string(),
            action.to_string(),
        ])
    }

    /// All p-tuples for a role within a tenant, as (resource, action).
    pub async fn policies_for_role(&self, role_name: &str, tenant_id: Uuid) -> Vec<(String, String)> {
        let enforcer = self.enforcer.read().await;
        enforcer
            .get_filtered_policy(0, vec![role_name.to_string(), tenant_id.to_string()])
            .into_iter()
            .filter_map(|mut rule| {
                if rule.len() == 4 {
                    let action = rule.pop().unwrap_or_default();
                    let resource = rule.pop().unwrap_or_default();
                    Some((resource, action))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Every loaded p-tuple, as [role, tenant, resource, action].
    pub async fn policies(&self) -> Vec<Vec<String>> {
        let enforcer = self.enforcer.read().await;
        enforcer.get_policy()
    }

    /// Drop all loaded p- and g-tuples.
    pub async fn clear(&self) -> Result<(), ServiceError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.clear_policy().await?;
        Ok(())
    }

    /// Bind a subject to a role within a tenant (g-tuple).
    pub async fn add_role_for_user(
        &self,
        subject: &str,
        role_name: &str,
        tenant_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let mut enforcer = self.enforcer.write().await;
        let added = enforcer
            .add_role_for_user(subject, role_name, Some(&tenant_id.to_string()))
            .await?;
        Ok(added)
    }

    pub async fn users_for_role(&self, role_name: &str, tenant_id: Uuid) -> Vec<String> {
        let enforcer = self.enforcer.read().await;
        enforcer.get_users_for_role(role_name, Some(&tenant_id.to_string()))
    }
}

/// Authorization checks backed by the in-memory engine, with the relational
/// store available for listing.
#[derive(Clone)]
pub struct AuthzService {
    engine: PolicyEngine,
    rbac: Arc<dyn RbacStore>,
}

impl AuthzService {
    pub fn new(engine: PolicyEngine, rbac: Arc<dyn RbacStore>) -> Self {
        Self { engine, rbac }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Tenant-scoped permission check. `subject` is a role name or a
    /// user subject bound to a role via a g-tuple.
    pub async fn enforce(
        &self,
        subject: &str,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, ServiceError> {
        let allowed = self
            .engine
            .enforce(subject, tenant_id, resource, action)
            .await?;
        tracing::debug!(
            subject = %subject,
            tenant_id = %tenant_id,
            resource = %resource,
            action = %action,
            allowed,
            "Authorization check"
        );
        Ok(allowed)
    }

    /// Permissions a role holds within a tenant, as (resource, action).
    /// Read from the relational store, which is the source of truth; when it
    /// has no rows for the role (legacy data loaded straight into the
    /// engine), fall back to the filtered policy tuples.
    pub async fn role_permissions(
        &self,
        role_name: &str,
        tenant_id: Uuid,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        if let Some(role) = self.rbac.find_role(tenant_id, role_name).await? {
            let permissions = self.rbac.permissions_for_role(role.role_id).await?;
            if !permissions.is_empty() {
                return Ok(permissions
                    .into_iter()
                    .map(|p| (p.resource, p.action))
                    .collect());
            }
        }
        Ok(self.engine.policies_for_role(role_name, tenant_id).await)
    }
}
