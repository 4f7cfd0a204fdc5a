//! TTL-backed revocation store trait.
//!
//! Any key-value service with per-key expiry satisfies this: an in-process
//! map with lazy expiry, or a shared cache such as Redis. Only atomic
//! single-key operations are used; no cross-key locking is needed.

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;

/// Key-value store with per-key TTL.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Sets `key` to `value`, expiring after `ttl`. Overwrites any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()>;

    /// Returns `true` if an unexpired value exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn exists(&self, key: &str) -> AuthResult<bool>;

    /// Returns the unexpired value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    /// Deletes `key`. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn delete(&self, key: &str) -> AuthResult<bool>;
}
