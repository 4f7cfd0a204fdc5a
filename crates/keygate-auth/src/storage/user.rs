//! User and membership lookup trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{Membership, User};

/// Read-only access to users and their organization memberships.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_user(&self, user_id: Uuid) -> AuthResult<Option<User>>;

    /// Returns the user's membership in the organization when its status is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_active_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> AuthResult<Option<Membership>>;
}
