//! PostgreSQL store implementation.
//!
//! Runtime-checked sqlx queries over a shared connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::ServiceError;
use crate::models::{Permission, RefreshToken, Role, Tenant, User};
use crate::store::{PolicyTuple, RbacStore, SessionStore, TenantStore, TokenProbe, UserStore};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Surface a unique-constraint violation on insert as `Conflict` so races
/// between concurrent creators are distinguishable from infrastructure
/// failures.
fn map_insert_error(err: sqlx::Error, what: &str) -> ServiceError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return ServiceError::Conflict(format!("{} already exists", what));
        }
    }
    ServiceError::Database(err)
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email_in_tenant(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE tenant_id = $1 AND LOWER(email) = LOWER($2)",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, tenant_id, email, password_hash, role_name, is_active, is_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.user_id)
        .bind(user.tenant_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "user"))?;
        Ok(())
    }
}

#[async_trait]
impl TenantStore for PostgresStore {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, ServiceError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn earliest_tenant(&self) -> Result<Option<Tenant>, ServiceError> {
        let tenant =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(tenant)
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, slug, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "tenant"))?;
        Ok(())
    }
}

#[async_trait]
impl RbacStore for PostgresStore {
    async fn find_role(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>, ServiceError> {
        let role =
            sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE tenant_id = $1 AND name = $2")
                .bind(tenant_id)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(role)
    }

    async fn insert_role(&self, role: &Role) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, tenant_id, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.role_id)
        .bind(role.tenant_id)
        .bind(&role.name)
        .bind(role.is_active)
        .bind(role.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "role"))?;
        Ok(())
    }

    async fn find_permission(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE tenant_id = $1 AND resource = $2 AND action = $3",
        )
        .bind(tenant_id)
        .bind(resource)
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;
        Ok(permission)
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (permission_id, tenant_id, resource, action, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.permission_id)
        .bind(permission.tenant_id)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(&permission.description)
        .bind(permission.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "permission"))?;
        Ok(())
    }

    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlink_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id)
                .bind(permission_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn association_exists(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM role_permissions WHERE role_id = $1 AND permission_id = $2",
        )
        .bind(role_id)
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn permissions_for_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, ServiceError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON p.permission_id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn all_associations(&self) -> Result<Vec<PolicyTuple>, ServiceError> {
        let tuples = sqlx::query_as::<_, PolicyTuple>(
            r#"
            SELECT r.name AS role_name, r.tenant_id, p.resource, p.action
            FROM role_permissions rp
            JOIN roles r ON rp.role_id = r.role_id
            JOIN permissions p ON rp.permission_id = p.permission_id
            ORDER BY r.tenant_id, r.name, p.resource, p.action
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tuples)
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, tenant_id, token_hash, device_info, ip_address, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.tenant_id)
        .bind(&token.token_hash)
        .bind(&token.device_info)
        .bind(&token.ip_address)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_valid_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<TokenProbe>, ServiceError> {
        let probes = sqlx::query_as::<_, TokenProbe>(
            r#"
            SELECT id, token_hash, expires_at FROM refresh_tokens
            WHERE user_id = $1 AND tenant_id = $2 AND expires_at >= NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(probes)
    }

    async fn update_token_hash(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET token_hash = $1, expires_at = $2 WHERE id = $3",
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_token(&self, id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND tenant_id = $2")
                .bind(user_id)
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_tokens(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE user_id = $1 AND tenant_id = $2 AND expires_at < NOW()",
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn enforce_retention(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        keep: i64,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND tenant_id = $2
              AND id NOT IN (
                SELECT id FROM refresh_tokens
                WHERE user_id = $1 AND tenant_id = $2 AND expires_at >= NOW()
                ORDER BY created_at DESC
                LIMIT $3
              )
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        // Postgres rejects a negative LIMIT; non-positive keep means keep
        // nothing, matching the in-process store.
        .bind(keep.max(0))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
