//! Storage traits for the engine's collaborators.
//!
//! This module defines storage interfaces for:
//!
//! - Client registrations (read-only)
//! - Authorization codes
//! - Refresh tokens and their rotation families
//! - Users, memberships, roles and permissions (read-only)
//! - Login sessions
//! - The TTL-backed revocation store
//!
//! # Implementations
//!
//! - [`memory`] - in-process implementations of every trait
//! - `keygate-auth-postgres` - PostgreSQL backend for the persistent traits
//! - `keygate-auth-redis` - Redis backend for [`RevocationStore`]

pub mod authorization_code;
pub mod client;
pub mod memory;
pub mod refresh_token;
pub mod revocation;
pub mod role;
pub mod session;
pub mod user;

use std::sync::Arc;

pub use authorization_code::{AuthorizationCodeStorage, CodeConsumption};
pub use client::ClientStorage;
pub use refresh_token::{RefreshTokenStorage, RotationOutcome};
pub use revocation::RevocationStore;
pub use role::RoleStorage;
pub use session::SessionStorage;
pub use user::UserStorage;

/// The set of stores the engine runs against.
#[derive(Clone)]
pub struct AuthStores {
    pub clients: Arc<dyn ClientStorage>,
    pub codes: Arc<dyn AuthorizationCodeStorage>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub users: Arc<dyn UserStorage>,
    pub roles: Arc<dyn RoleStorage>,
    pub sessions: Arc<dyn SessionStorage>,
    pub revocations: Arc<dyn RevocationStore>,
}
