//! Login session storage trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::UserSession;

/// Storage trait for persisted login sessions.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stores a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, session: &UserSession) -> AuthResult<()>;

    /// Lists a user's sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_user(&self, user_id: Uuid) -> AuthResult<Vec<UserSession>>;

    /// Deletes every session of a user. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64>;

    /// Deletes every session opened in an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_by_organization(&self, organization_id: Uuid) -> AuthResult<u64>;

    /// Deletes a user's sessions opened in an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64>;
}
