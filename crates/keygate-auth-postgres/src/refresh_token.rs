//! Refresh token storage.
//!
//! Only token hashes are stored. Rotation inserts the successor and retires
//! the presented token inside one transaction; the retirement is a
//! conditional update, so of two concurrent rotations exactly one commits.
//!
//! Rotation and revocation both hold a transaction-scoped advisory lock per
//! family. A revocation therefore waits for an in-flight rotation to commit
//! and its UPDATE, run as a later statement, sees the successor.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::storage::{RefreshTokenStorage, RotationOutcome};
use keygate_auth::types::OAuthRefreshToken;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

type TokenRow = (
    Uuid,
    String,
    Uuid,
    String,
    Uuid,
    Option<Uuid>,
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    bool,
    Option<OffsetDateTime>,
    Option<Uuid>,
);

fn token_from_row(row: TokenRow) -> OAuthRefreshToken {
    OAuthRefreshToken {
        id: row.0,
        token_hash: row.1,
        family_id: row.2,
        client_id: row.3,
        user_id: row.4,
        organization_id: row.5,
        scope: row.6,
        user_agent_hash: row.7,
        ip_hash: row.8,
        created_at: row.9,
        expires_at: row.10,
        revoked: row.11,
        used_at: row.12,
        replaced_by: row.13,
    }
}

const COLUMNS: &str = "id, token_hash, family_id, client_id, user_id, organization_id, scope, \
     user_agent_hash, ip_hash, created_at, expires_at, revoked, used_at, replaced_by";

const INSERT: &str = r#"
    INSERT INTO refresh_token
        (id, token_hash, family_id, client_id, user_id, organization_id, scope,
         user_agent_hash, ip_hash, created_at, expires_at, revoked, used_at, replaced_by)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

fn bind_insert(
    token: &OAuthRefreshToken,
) -> sqlx_core::query::Query<'_, sqlx_postgres::Postgres, sqlx_postgres::PgArguments> {
    query(INSERT)
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.family_id)
        .bind(&token.client_id)
        .bind(token.user_id)
        .bind(token.organization_id)
        .bind(&token.scope)
        .bind(&token.user_agent_hash)
        .bind(&token.ip_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.used_at)
        .bind(token.replaced_by)
}

const LOCK_FAMILY: &str = "SELECT pg_advisory_xact_lock(hashtext($1::text))";

/// PostgreSQL refresh token storage.
#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn insert(&self, token: &OAuthRefreshToken) -> StorageResult<()> {
        bind_insert(token)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| StorageError::from_insert(e, format!("refresh token {}", token.id)))?;
        Ok(())
    }

    async fn fetch_by_hash(&self, token_hash: &str) -> StorageResult<Option<OAuthRefreshToken>> {
        let sql = format!("SELECT {COLUMNS} FROM refresh_token WHERE token_hash = $1");
        let row: Option<TokenRow> = query_as(&sql)
            .bind(token_hash)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.map(token_from_row))
    }

    async fn fetch_family(&self, family_id: Uuid) -> StorageResult<Vec<OAuthRefreshToken>> {
        let sql =
            format!("SELECT {COLUMNS} FROM refresh_token WHERE family_id = $1 ORDER BY created_at");
        let rows: Vec<TokenRow> = query_as(&sql)
            .bind(family_id)
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.into_iter().map(token_from_row).collect())
    }

    async fn rotate_in_transaction(
        &self,
        presented_id: Uuid,
        successor: &OAuthRefreshToken,
        used_at: OffsetDateTime,
    ) -> StorageResult<RotationOutcome> {
        let mut tx = self.pool.begin().await?;

        query(LOCK_FAMILY)
            .bind(successor.family_id)
            .execute(&mut *tx)
            .await?;

        bind_insert(successor)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_insert(e, format!("refresh token {}", successor.id)))?;

        let retired = query(
            r#"
            UPDATE refresh_token
            SET used_at = $2, replaced_by = $3
            WHERE id = $1
              AND used_at IS NULL
              AND revoked = false
            "#,
        )
        .bind(presented_id)
        .bind(used_at)
        .bind(successor.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if retired == 1 {
            tx.commit().await?;
            return Ok(RotationOutcome::Rotated);
        }

        let state: Option<(bool,)> = query_as("SELECT revoked FROM refresh_token WHERE id = $1")
            .bind(presented_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.rollback().await?;

        match state {
            None => Err(StorageError::not_found(format!(
                "refresh token {presented_id}"
            ))),
            Some((true,)) => Ok(RotationOutcome::Revoked),
            Some((false,)) => Ok(RotationOutcome::AlreadyUsed),
        }
    }

    /// Revokes matching tokens after locking every affected family.
    ///
    /// Locks are taken in `family_id` order so concurrent bulk revocations
    /// cannot deadlock each other.
    async fn revoke_where(&self, predicate: &str, binds: &[Uuid]) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;

        let lock_sql = format!(
            "SELECT pg_advisory_xact_lock(hashtext(families.family_id::text)) \
             FROM (SELECT DISTINCT family_id FROM refresh_token \
                   WHERE revoked = false AND {predicate} ORDER BY family_id) AS families"
        );
        let mut lock = query(&lock_sql);
        for id in binds {
            lock = lock.bind(*id);
        }
        lock.execute(&mut *tx).await?;

        let update_sql =
            format!("UPDATE refresh_token SET revoked = true WHERE revoked = false AND {predicate}");
        let mut update = query(&update_sql);
        for id in binds {
            update = update.bind(*id);
        }
        let revoked = update.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(revoked)
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresRefreshTokenStorage {
    async fn create(&self, token: &OAuthRefreshToken) -> AuthResult<()> {
        Ok(self.insert(token).await?)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<OAuthRefreshToken>> {
        Ok(self.fetch_by_hash(token_hash).await?)
    }

    async fn find_by_family(&self, family_id: Uuid) -> AuthResult<Vec<OAuthRefreshToken>> {
        Ok(self.fetch_family(family_id).await?)
    }

    async fn rotate(
        &self,
        presented_id: Uuid,
        successor: &OAuthRefreshToken,
        used_at: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        Ok(self
            .rotate_in_transaction(presented_id, successor, used_at)
            .await?)
    }

    async fn revoke_family(&self, family_id: Uuid) -> AuthResult<u64> {
        Ok(self.revoke_where("family_id = $1", &[family_id]).await?)
    }

    async fn revoke_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        Ok(self.revoke_where("user_id = $1", &[user_id]).await?)
    }

    async fn revoke_by_organization(&self, organization_id: Uuid) -> AuthResult<u64> {
        Ok(self
            .revoke_where("organization_id = $1", &[organization_id])
            .await?)
    }

    async fn revoke_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64> {
        Ok(self
            .revoke_where(
                "user_id = $1 AND organization_id = $2",
                &[user_id, organization_id],
            )
            .await?)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM refresh_token WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_from_row() {
        let now = OffsetDateTime::now_utc();
        let family = Uuid::new_v4();
        let token = token_from_row((
            Uuid::new_v4(),
            "hash".to_string(),
            family,
            "c1".to_string(),
            Uuid::new_v4(),
            None,
            "profile".to_string(),
            "ua".to_string(),
            "ip".to_string(),
            now,
            now + time::Duration::days(30),
            false,
            None,
            None,
        ));
        assert_eq!(token.family_id, family);
        assert!(token.is_active_at(now));
    }
}
