//! User session storage.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::storage::SessionStorage;
use keygate_auth::types::UserSession;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

/// PostgreSQL session storage.
#[derive(Debug, Clone)]
pub struct PostgresSessionStorage {
    pool: Arc<PgPool>,
}

impl PostgresSessionStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn delete_where(&self, predicate: &str, binds: &[Uuid]) -> StorageResult<u64> {
        let sql = format!("DELETE FROM user_session WHERE {predicate}");
        let mut q = query(&sql);
        for id in binds {
            q = q.bind(*id);
        }
        Ok(q.execute(self.pool.as_ref()).await?.rows_affected())
    }
}

#[async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn create(&self, session: &UserSession) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO user_session (id, user_id, organization_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.organization_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::from_insert(e, format!("session {}", session.id)))?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AuthResult<Vec<UserSession>> {
        let rows: Vec<(Uuid, Uuid, Option<Uuid>, OffsetDateTime, OffsetDateTime)> = query_as(
            r#"
            SELECT id, user_id, organization_id, created_at, expires_at
            FROM user_session
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(
                |(id, user_id, organization_id, created_at, expires_at)| UserSession {
                    id,
                    user_id,
                    organization_id,
                    created_at,
                    expires_at,
                },
            )
            .collect())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        Ok(self.delete_where("user_id = $1", &[user_id]).await?)
    }

    async fn delete_by_organization(&self, organization_id: Uuid) -> AuthResult<u64> {
        Ok(self
            .delete_where("organization_id = $1", &[organization_id])
            .await?)
    }

    async fn delete_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64> {
        Ok(self
            .delete_where(
                "user_id = $1 AND organization_id = $2",
                &[user_id, organization_id],
            )
            .await?)
    }
}
