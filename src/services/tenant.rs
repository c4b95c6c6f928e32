use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::Tenant;
use crate::store::TenantStore;

/// Tenant binding for a request. Carried explicitly through call sites;
/// there is no ambient or thread-local tenant state.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub tenant_id: Option<Uuid>,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
        }
    }

    pub fn unbound() -> Self {
        Self { tenant_id: None }
    }
}

/// Resolves which tenant a request operates under.
///
/// Precedence: an already-bound context wins, then an explicit hint (UUID
/// or slug), then the configured default slug, then the earliest-created
/// tenant. Resolution only fails when no tenant exists at all.
#[derive(Clone)]
pub struct TenantResolver {
    tenants: Arc<dyn TenantStore>,
    default_slug: String,
}

impl TenantResolver {
    pub fn new(tenants: Arc<dyn TenantStore>, default_slug: String) -> Self {
        Self {
            tenants,
            default_slug,
        }
    }

    /// The tenant a bound context refers to. Errors when the context is
    /// unbound; callers that can fall back should use `resolve_tenant_id`.
    pub fn current_tenant_id(&self, ctx: &TenantContext) -> Result<Uuid, ServiceError> {
        ctx.tenant_id
            .ok_or_else(|| ServiceError::BadRequest("no tenant bound to request".to_string()))
    }

    /// Resolve a tenant from context, hint, or fallbacks.
    pub async fn resolve_tenant_id(
        &self,
        ctx: &TenantContext,
        hint: Option<&str>,
    ) -> Result<Uuid, ServiceError> {
        if let Some(tenant_id) = ctx.tenant_id {
            return Ok(tenant_id);
        }

        if let Some(hint) = hint {
            if let Some(tenant) = self.lookup_hint(hint).await? {
                return Ok(tenant.tenant_id);
            }
            // An unknown hint falls through to the defaults rather than
            // failing the request.
            tracing::warn!(hint = %hint, "Tenant hint did not match any tenant");
        }

        if let Some(tenant) = self.tenants.find_tenant_by_slug(&self.default_slug).await? {
            return Ok(tenant.tenant_id);
        }

        if let Some(tenant) = self.tenants.earliest_tenant().await? {
            return Ok(tenant.tenant_id);
        }

        Err(ServiceError::BadRequest(
            "no tenants are provisioned".to_string(),
        ))
    }

    /// A hint is either a tenant UUID or a slug.
    async fn lookup_hint(&self, hint: &str) -> Result<Option<Tenant>, ServiceError> {
        if let Ok(tenant_id) = hint.parse::<Uuid>() {
            return self.tenants.find_tenant_by_id(tenant_id).await;
        }
        self.tenants.find_tenant_by_slug(hint).await
    }
}
