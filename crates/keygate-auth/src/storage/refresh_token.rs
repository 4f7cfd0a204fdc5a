//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as keyed hashes only
//! - [`RefreshTokenStorage::rotate`] is the single atomic check-and-set that
//!   makes concurrent replay detection race-free
//! - Family revocation must reach every token sharing the `family_id`

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::OAuthRefreshToken;

/// Result of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The presented token was retired and the successor stored.
    Rotated,
    /// Another request retired the presented token first. Nothing was written.
    AlreadyUsed,
    /// The presented token was revoked in the meantime. Nothing was written.
    Revoked,
}

/// Storage trait for refresh tokens.
///
/// # Implementations
///
/// - [`crate::storage::memory::InMemoryRefreshTokenStorage`]
/// - `keygate-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token (first issuance of a family).
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn create(&self, token: &OAuthRefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by its hash, whatever its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<OAuthRefreshToken>>;

    /// Lists every token of a family, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_family(&self, family_id: Uuid) -> AuthResult<Vec<OAuthRefreshToken>>;

    /// Retires `presented_id` and activates `successor` as one atomic unit.
    ///
    /// Within one transaction: insert `successor`, then set
    /// `used_at = used_at_value, replaced_by = successor.id` on the presented
    /// token only where `used_at IS NULL AND revoked = false`. If that
    /// conditional update touches no row the transaction is rolled back and
    /// the losing outcome returned, so no successor survives. If the future
    /// is dropped before commit, the transaction rolls back.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be committed; in that case
    /// the caller must treat the family as compromised.
    async fn rotate(
        &self,
        presented_id: Uuid,
        successor: &OAuthRefreshToken,
        used_at: OffsetDateTime,
    ) -> AuthResult<RotationOutcome>;

    /// Revokes every token in a family. Returns the number newly revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_family(&self, family_id: Uuid) -> AuthResult<u64>;

    /// Revokes every token of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_user(&self, user_id: Uuid) -> AuthResult<u64>;

    /// Revokes every token scoped to an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_organization(&self, organization_id: Uuid) -> AuthResult<u64>;

    /// Revokes every token of a user scoped to an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64>;

    /// Deletes tokens that expired before `now`. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
