//! OAuth client storage.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_auth::AuthResult;
use keygate_auth::storage::ClientStorage;
use keygate_auth::types::ClientApp;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::{PgPool, StorageError, StorageResult};

type ClientRow = (
    String,
    String,
    Option<String>,
    Vec<String>,
    Vec<String>,
    bool,
    bool,
);

fn client_from_row(row: ClientRow) -> ClientApp {
    ClientApp {
        client_id: row.0,
        name: row.1,
        client_secret_hash: row.2,
        redirect_uris: row.3,
        allowed_scopes: row.4,
        is_confidential: row.5,
        active: row.6,
    }
}

/// PostgreSQL client registry.
#[derive(Debug, Clone)]
pub struct PostgresClientStorage {
    pool: Arc<PgPool>,
}

impl PostgresClientStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a client registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, client: &ClientApp) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO oauth_client
                (client_id, name, client_secret_hash, redirect_uris, allowed_scopes, is_confidential, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (client_id) DO UPDATE SET
                name = EXCLUDED.name,
                client_secret_hash = EXCLUDED.client_secret_hash,
                redirect_uris = EXCLUDED.redirect_uris,
                allowed_scopes = EXCLUDED.allowed_scopes,
                is_confidential = EXCLUDED.is_confidential,
                active = EXCLUDED.active
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.name)
        .bind(&client.client_secret_hash)
        .bind(&client.redirect_uris)
        .bind(&client.allowed_scopes)
        .bind(client.is_confidential)
        .bind(client.active)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn fetch(&self, client_id: &str) -> StorageResult<Option<ClientApp>> {
        let row: Option<ClientRow> = query_as(
            r#"
            SELECT client_id, name, client_secret_hash, redirect_uris, allowed_scopes,
                   is_confidential, active
            FROM oauth_client
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(client_from_row))
    }
}

#[async_trait]
impl ClientStorage for PostgresClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<ClientApp>> {
        Ok(self.fetch(client_id).await?)
    }
}
