//! User model - tenant-scoped principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity. The credential hash never leaves the crate in serialized
/// form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role label within the tenant; the authorization subject for policy
    /// checks.
    pub role_name: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user. Starts active but unverified.
    pub fn new(tenant_id: Uuid, email: String, password_hash: String, role_name: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tenant_id,
            email,
            password_hash,
            role_name,
            is_active: true,
            is_verified: false,
            created_at: Utc::now(),
        }
    }

    /// Whether this user may hold a session.
    pub fn can_authenticate(&self) -> bool {
        self.is_active && self.is_verified
    }
}
