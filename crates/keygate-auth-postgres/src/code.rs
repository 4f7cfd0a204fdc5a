//! Authorization code storage.
//!
//! Consumption is one conditional `UPDATE ... RETURNING`; only when it
//! touches no row is the code read again to classify the failure.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::oauth::PkceChallengeMethod;
use keygate_auth::storage::{AuthorizationCodeStorage, CodeConsumption};
use keygate_auth::types::AuthorizationCode;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

type CodeRow = (
    Uuid,
    String,
    String,
    Uuid,
    Option<Uuid>,
    String,
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    bool,
);

fn code_from_row(row: CodeRow) -> StorageResult<AuthorizationCode> {
    let code_challenge_method = PkceChallengeMethod::parse(&row.8)
        .map_err(|e| StorageError::corrupt(format!("authorization code {}: {e}", row.0)))?;
    Ok(AuthorizationCode {
        id: row.0,
        code_hash: row.1,
        client_id: row.2,
        user_id: row.3,
        organization_id: row.4,
        redirect_uri: row.5,
        scope: row.6,
        code_challenge: row.7,
        code_challenge_method,
        created_at: row.9,
        expires_at: row.10,
        used: row.11,
    })
}

const RETURNING: &str = "id, code_hash, client_id, user_id, organization_id, redirect_uri, scope, \
     code_challenge, code_challenge_method, created_at, expires_at, used";

/// PostgreSQL authorization code storage.
#[derive(Debug, Clone)]
pub struct PostgresAuthorizationCodeStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthorizationCodeStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn insert(&self, code: &AuthorizationCode) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO authorization_code
                (id, code_hash, client_id, user_id, organization_id, redirect_uri, scope,
                 code_challenge, code_challenge_method, created_at, expires_at, used)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(code.id)
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(code.user_id)
        .bind(code.organization_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(code.code_challenge_method.as_str())
        .bind(code.created_at)
        .bind(code.expires_at)
        .bind(code.used)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::from_insert(e, format!("authorization code {}", code.id)))?;
        Ok(())
    }

    async fn consume_row(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        now: OffsetDateTime,
    ) -> StorageResult<CodeConsumption> {
        let sql = format!(
            r#"
            UPDATE authorization_code
            SET used = true
            WHERE code_hash = $1
              AND used = false
              AND expires_at > $2
              AND client_id = $3
              AND redirect_uri = $4
            RETURNING {RETURNING}
            "#
        );
        let consumed: Option<CodeRow> = query_as(&sql)
            .bind(code_hash)
            .bind(now)
            .bind(client_id)
            .bind(redirect_uri)
            .fetch_optional(self.pool.as_ref())
            .await?;
        if let Some(row) = consumed {
            return Ok(CodeConsumption::Consumed(code_from_row(row)?));
        }

        let existing: Option<(bool, OffsetDateTime, String, String)> = query_as(
            r#"
            SELECT used, expires_at, client_id, redirect_uri
            FROM authorization_code
            WHERE code_hash = $1
            "#,
        )
        .bind(code_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(match existing {
            None => CodeConsumption::NotFound,
            Some((true, _, _, _)) => CodeConsumption::AlreadyUsed,
            Some((_, expires_at, _, _)) if now >= expires_at => CodeConsumption::Expired,
            Some((_, _, stored_client, stored_redirect))
                if stored_client != client_id || stored_redirect != redirect_uri =>
            {
                CodeConsumption::Mismatch
            }
            // Consumable again by the time we looked; a concurrent writer won.
            Some(_) => CodeConsumption::AlreadyUsed,
        })
    }
}

#[async_trait]
impl AuthorizationCodeStorage for PostgresAuthorizationCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        Ok(self.insert(code).await?)
    }

    async fn consume(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        now: OffsetDateTime,
    ) -> AuthResult<CodeConsumption> {
        Ok(self
            .consume_row(code_hash, client_id, redirect_uri, now)
            .await?)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM authorization_code WHERE expires_at <= $1")
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

    fn row(method: &str) -> CodeRow {
        let now = OffsetDateTime::now_utc();
        (
            Uuid::new_v4(),
            "hash".to_string(),
            "c1".to_string(),
            Uuid::new_v4(),
            None,
            "https://app/cb".to_string(),
            "profile".to_string(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            method.to_string(),
            now,
            now + time::Duration::minutes(10),
            false,
        )
    }

    #[test]
    fn test_code_from_row() {
        let code = code_from_row(row("S256")).unwrap();
        assert_eq!(code.code_challenge_method, PkceChallengeMethod::S256);
        assert_eq!(code.client_id, "c1");
    }

    #[test]
    fn test_unknown_method_is_corrupt() {
        let err = code_from_row(row("plain")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
