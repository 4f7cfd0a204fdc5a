//! PostgreSQL storage backend for Keygate Auth
//!
//! Provides persistent storage for:
//!
//! - OAuth clients
//! - Users, organization memberships, roles and permissions
//! - Authorization codes (single-use via conditional update)
//! - Refresh tokens (transactional rotation)
//! - User sessions
//!
//! Revocation markers are not stored here; pair this backend with
//! `keygate-auth-redis` or the in-memory TTL store.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/keygate").await?;
//! storage.migrate().await?;
//! let stores = storage.auth_stores(revocations);
//! ```

pub mod client;
pub mod code;
pub mod migrations;
pub mod refresh_token;
pub mod role;
pub mod session;
pub mod user;

use std::sync::Arc;

use keygate_auth::AuthError;
use keygate_auth::storage::{AuthStores, RevocationStore};
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use client::PostgresClientStorage;
pub use code::PostgresAuthorizationCodeStorage;
pub use refresh_token::PostgresRefreshTokenStorage;
pub use role::PostgresRoleStorage;
pub use session::PostgresSessionStorage;
pub use user::PostgresUserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx_core::migrate::MigrateError),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a `Corrupt` error.
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Maps a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(err: sqlx_core::Error, what: impl std::fmt::Display) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for the token lifecycle engine.
///
/// Holds a connection pool and hands out one store per storage trait.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn clients(&self) -> PostgresClientStorage {
        PostgresClientStorage::new(self.pool.clone())
    }

    #[must_use]
    pub fn codes(&self) -> PostgresAuthorizationCodeStorage {
        PostgresAuthorizationCodeStorage::new(self.pool.clone())
    }

    #[must_use]
    pub fn refresh_tokens(&self) -> PostgresRefreshTokenStorage {
        PostgresRefreshTokenStorage::new(self.pool.clone())
    }

    #[must_use]
    pub fn users(&self) -> PostgresUserStorage {
        PostgresUserStorage::new(self.pool.clone())
    }

    #[must_use]
    pub fn roles(&self) -> PostgresRoleStorage {
        PostgresRoleStorage::new(self.pool.clone())
    }

    #[must_use]
    pub fn sessions(&self) -> PostgresSessionStorage {
        PostgresSessionStorage::new(self.pool.clone())
    }

    /// Bundles every store with the given revocation store for the engine.
    #[must_use]
    pub fn auth_stores(&self, revocations: Arc<dyn RevocationStore>) -> AuthStores {
        AuthStores {
            clients: Arc::new(self.clients()),
            codes: Arc::new(self.codes()),
            refresh_tokens: Arc::new(self.refresh_tokens()),
            users: Arc::new(self.users()),
            roles: Arc::new(self.roles()),
            sessions: Arc::new(self.sessions()),
            revocations,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("client abc123");
        assert!(err.is_not_found());
        assert!(!err.is_database_error());
        assert_eq!(err.to_string(), "Not found: client abc123");
    }

    #[test]
    fn test_storage_error_maps_to_auth_storage() {
        let err: AuthError = StorageError::conflict("refresh token x already exists").into();
        assert!(matches!(err, AuthError::Storage { .. }));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_non_database_insert_error_is_database() {
        let err = StorageError::from_insert(sqlx_core::Error::RowNotFound, "client c1");
        assert!(err.is_database_error());
        assert!(!err.is_conflict());
    }
}
