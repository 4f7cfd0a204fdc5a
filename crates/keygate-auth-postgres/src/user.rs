//! Users and organization memberships.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::storage::UserStorage;
use keygate_auth::types::{Membership, MembershipStatus, User};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

/// PostgreSQL user directory.
#[derive(Debug, Clone)]
pub struct PostgresUserStorage {
    pool: Arc<PgPool>,
}

impl PostgresUserStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert_user(&self, user: &User) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO app_user (id, email, is_superadmin, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                is_superadmin = EXCLUDED.is_superadmin,
                active = EXCLUDED.active
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.is_superadmin)
        .bind(user.active)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::from_insert(e, format!("user {}", user.email)))?;
        Ok(())
    }

    /// Inserts or replaces the membership for `(organization_id, user_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert_membership(&self, membership: &Membership) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO organization_membership (organization_id, user_id, role_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (organization_id, user_id) DO UPDATE SET
                role_id = EXCLUDED.role_id,
                status = EXCLUDED.status
            "#,
        )
        .bind(membership.organization_id)
        .bind(membership.user_id)
        .bind(membership.role_id)
        .bind(membership.status.as_str())
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn fetch_user(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        let row: Option<(Uuid, String, bool, bool)> = query_as(
            "SELECT id, email, is_superadmin, active FROM app_user WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(row.map(|(id, email, is_superadmin, active)| User {
            id,
            email,
            is_superadmin,
            active,
        }))
    }

    async fn fetch_active_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<Membership>> {
        let row: Option<(Uuid, Uuid, Uuid, String)> = query_as(
            r#"
            SELECT organization_id, user_id, role_id, status
            FROM organization_membership
            WHERE organization_id = $1
              AND user_id = $2
              AND status = 'active'
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(|(organization_id, user_id, role_id, status)| -> StorageResult<Membership> {
            let status = MembershipStatus::parse(&status).ok_or_else(|| {
                StorageError::corrupt(format!("membership status {status:?}"))
            })?;
            Ok(Membership {
                organization_id,
                user_id,
                role_id,
                status,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl UserStorage for PostgresUserStorage {
    async fn get_user(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.fetch_user(user_id).await?)
    }

    async fn get_active_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> AuthResult<Option<Membership>> {
        Ok(self
            .fetch_active_membership(organization_id, user_id)
            .await?)
    }
}
