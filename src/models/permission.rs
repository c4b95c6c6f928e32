//! Permission model - (resource, action) pair, unique per tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub tenant_id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission.
    pub fn new(
        tenant_id: Uuid,
        resource: String,
        action: String,
        description: Option<String>,
    ) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            tenant_id,
            resource,
            action,
            description,
            created_at: Utc::now(),
        }
    }
}
