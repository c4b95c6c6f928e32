//! Tenant model - the isolation boundary of the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant entity. Every principal, role, permission, and refresh token is
/// scoped to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new active tenant.
    pub fn new(slug: String, name: String) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            slug,
            name,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
