//! Role and permission lookup trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{Permission, Role};

/// Read-only access to roles and their permissions.
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Finds a role by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_role(&self, role_id: Uuid) -> AuthResult<Option<Role>>;

    /// Returns the permissions assigned to a role, unfiltered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_role_permissions(&self, role_id: Uuid) -> AuthResult<Vec<Permission>>;

    /// Returns every system permission (`is_system = true`, no organization).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_system_permissions(&self) -> AuthResult<Vec<Permission>>;
}
