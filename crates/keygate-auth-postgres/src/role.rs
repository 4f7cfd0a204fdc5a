//! Roles, permissions and role-permission assignments.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::storage::RoleStorage;
use keygate_auth::types::{Permission, Role};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

type RoleRow = (Uuid, String, bool, Option<Uuid>);

fn permission_from_row((id, name, is_system, organization_id): RoleRow) -> Permission {
    Permission {
        id,
        name,
        is_system,
        organization_id,
    }
}

/// PostgreSQL role catalog.
#[derive(Debug, Clone)]
pub struct PostgresRoleStorage {
    pool: Arc<PgPool>,
}

impl PostgresRoleStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a role.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id exists, or a database error.
    pub async fn insert_role(&self, role: &Role) -> StorageResult<()> {
        query("INSERT INTO role (id, name, is_system, organization_id) VALUES ($1, $2, $3, $4)")
            .bind(role.id)
            .bind(&role.name)
            .bind(role.is_system)
            .bind(role.organization_id)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| StorageError::from_insert(e, format!("role {}", role.id)))?;
        Ok(())
    }

    /// Inserts a permission.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id exists, or a database error.
    pub async fn insert_permission(&self, permission: &Permission) -> StorageResult<()> {
        query(
            "INSERT INTO permission (id, name, is_system, organization_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(permission.id)
        .bind(&permission.name)
        .bind(permission.is_system)
        .bind(permission.organization_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::from_insert(e, format!("permission {}", permission.id)))?;
        Ok(())
    }

    /// Assigns a permission to a role. Assigning twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn assign(&self, role_id: Uuid, permission_id: Uuid) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO role_permission (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn fetch_role(&self, role_id: Uuid) -> StorageResult<Option<Role>> {
        let row: Option<RoleRow> =
            query_as("SELECT id, name, is_system, organization_id FROM role WHERE id = $1")
                .bind(role_id)
                .fetch_optional(self.pool.as_ref())
                .await?;
        Ok(row.map(|(id, name, is_system, organization_id)| Role {
            id,
            name,
            is_system,
            organization_id,
        }))
    }

    async fn fetch_role_permissions(&self, role_id: Uuid) -> StorageResult<Vec<Permission>> {
        let rows: Vec<RoleRow> = query_as(
            r#"
            SELECT p.id, p.name, p.is_system, p.organization_id
            FROM permission p
            JOIN role_permission rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(role_id)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.into_iter().map(permission_from_row).collect())
    }

    async fn fetch_system_permissions(&self) -> StorageResult<Vec<Permission>> {
        let rows: Vec<RoleRow> = query_as(
            r#"
            SELECT id, name, is_system, organization_id
            FROM permission
            WHERE is_system = true
              AND organization_id IS NULL
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.into_iter().map(permission_from_row).collect())
    }
}

#[async_trait]
impl RoleStorage for PostgresRoleStorage {
    async fn get_role(&self, role_id: Uuid) -> AuthResult<Option<Role>> {
        Ok(self.fetch_role(role_id).await?)
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> AuthResult<Vec<Permission>> {
        Ok(self.fetch_role_permissions(role_id).await?)
    }

    async fn list_system_permissions(&self) -> AuthResult<Vec<Permission>> {
        Ok(self.fetch_system_permissions().await?)
    }
}
