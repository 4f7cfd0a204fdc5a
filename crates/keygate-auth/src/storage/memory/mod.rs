//! In-process storage implementations.
//!
//! Every trait in [`crate::storage`] has an in-memory implementation here.
//! They back the test suite and single-instance deployments. The refresh
//! token store serializes rotation behind one lock, which gives the same
//! check-and-set guarantee as the PostgreSQL transaction.

mod codes;
mod directory;
mod refresh_tokens;
mod revocation;
mod sessions;

use std::sync::Arc;

pub use codes::InMemoryAuthorizationCodeStorage;
pub use directory::{InMemoryClientStorage, InMemoryRoleStorage, InMemoryUserStorage};
pub use refresh_tokens::InMemoryRefreshTokenStorage;
pub use revocation::InMemoryRevocationStore;
pub use sessions::InMemorySessionStorage;

use super::AuthStores;

/// Concrete handles to a full set of in-memory stores.
///
/// Keeps typed access for seeding data while [`InMemoryStores::as_auth_stores`]
/// hands the same instances to the engine.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub clients: Arc<InMemoryClientStorage>,
    pub codes: Arc<InMemoryAuthorizationCodeStorage>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStorage>,
    pub users: Arc<InMemoryUserStorage>,
    pub roles: Arc<InMemoryRoleStorage>,
    pub sessions: Arc<InMemorySessionStorage>,
    pub revocations: Arc<InMemoryRevocationStore>,
}

impl InMemoryStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_auth_stores(&self) -> AuthStores {
        AuthStores {
            clients: self.clients.clone(),
            codes: self.codes.clone(),
            refresh_tokens: self.refresh_tokens.clone(),
            users: self.users.clone(),
            roles: self.roles.clone(),
            sessions: self.sessions.clone(),
            revocations: self.revocations.clone(),
        }
    }
}
