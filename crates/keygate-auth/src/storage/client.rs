//! Client registry trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::ClientApp;

/// Read-only access to registered clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// # Returns
    ///
    /// Returns `Some(client)` if registered, `None` otherwise. Inactive
    /// clients are returned; callers decide how to treat them.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<ClientApp>>;
}
