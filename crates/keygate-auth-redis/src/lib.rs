//! Redis revocation store for Keygate Auth
//!
//! Stores access-token denylist entries and session revocation markers in
//! Redis so every engine instance sees the same revocations. Keys expire
//! through native Redis TTLs; nothing needs sweeping.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth_redis::{RedisConfig, RedisRevocationStore};
//!
//! let store = RedisRevocationStore::connect(&RedisConfig::default()).await?;
//! let stores = postgres.auth_stores(Arc::new(store));
//! ```

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use keygate_auth::storage::RevocationStore;
use keygate_auth::{AuthError, AuthResult};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration
// =============================================================================

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the Redis store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The pool could not be built from the configuration.
    #[error("Redis pool configuration error: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// No connection could be taken from the pool.
    #[error("Redis connection error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

// =============================================================================
// Revocation Store
// =============================================================================

/// [`RevocationStore`] backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisRevocationStore {
    pool: Pool,
}

impl RedisRevocationStore {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool from `config` and checks that Redis answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or the first
    /// connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        tracing::info!(url = %config.url, "Connecting revocation store to Redis");

        let timeout = Duration::from_millis(config.timeout_ms);
        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let pool_config = redis_config.pool.get_or_insert_with(Default::default);
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        // Test connection
        drop(pool.get().await?);

        tracing::info!("Revocation store connected to Redis");
        Ok(Self::new(pool))
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StorageError> {
        self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to get Redis connection");
            StorageError::from(e)
        })
    }
}

impl std::fmt::Debug for RedisRevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRevocationStore")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis SET error");
                StorageError::from(e)
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        let mut conn = self.connection().await?;
        Ok(conn
            .exists::<_, bool>(key)
            .await
            .map_err(StorageError::from)?)
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn
            .get::<_, Option<String>>(key)
            .await
            .map_err(StorageError::from)?)
    }

    async fn delete(&self, key: &str) -> AuthResult<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(StorageError::from)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_config_defaults_apply_to_missing_fields() {
        let config: RedisConfig = toml::from_str("url = \"redis://cache:6379\"").unwrap();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn test_errors_map_to_storage() {
        let err: AuthError = StorageError::from(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
        .into();
        assert!(matches!(err, AuthError::Storage { .. }));
    }
}
