//! Role model - tenant-scoped role, unique per (tenant, name).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a new active role.
    pub fn new(tenant_id: Uuid, name: String) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            tenant_id,
            name,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
