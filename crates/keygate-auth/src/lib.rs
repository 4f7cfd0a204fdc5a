//! # keygate-auth
//!
//! Token lifecycle engine for a multi-tenant identity provider.
//!
//! This crate provides:
//! - Authorization codes with mandatory PKCE (S256)
//! - Code-for-token exchange with signed JWT access tokens
//! - Refresh token rotation with family replay detection and device binding
//! - Organization-isolated role and permission resolution
//! - Access token and session revocation on a TTL store
//! - Fire-and-forget security audit events
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration and loading
//! - [`context`] - Per-request context: cancellation, deadline, client metadata
//! - [`credential`] - Lookup hashes, device binding, client secrets
//! - [`oauth`] - PKCE, authorization codes, token endpoint responses
//! - [`permission`] - Role and permission resolution
//! - [`token`] - Issuance, rotation and revocation
//! - [`audit`] - Security event sinks and dispatch
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`engine`] - Wires everything together

pub mod audit;
pub mod config;
pub mod context;
pub mod credential;
pub mod engine;
pub mod error;
pub mod oauth;
pub mod observability;
pub mod permission;
pub mod storage;
pub mod token;
pub mod types;

pub use audit::{AuditAction, AuditDispatcher, AuditEvent, AuditSink, TracingAuditSink};
pub use config::{ConfigError, KeygateConfig};
pub use context::{Principal, RequestContext};
pub use engine::AuthEngine;
pub use error::{AuthError, ErrorCategory};
pub use oauth::{IssueCodeRequest, TokenErrorResponse, TokenResponse};
pub use permission::ResolvedPermissions;
pub use storage::AuthStores;
pub use token::{AccessTokenClaims, ExchangeCodeRequest, JwtSigner, RevocationSummary};

/// Type alias for engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keygate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::audit::{
        AuditAction, AuditDispatcher, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink,
    };
    pub use crate::config::{ConfigError, KeygateConfig};
    pub use crate::context::{Principal, RequestContext};
    pub use crate::engine::AuthEngine;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::oauth::{IssueCodeRequest, TokenErrorResponse, TokenResponse};
    pub use crate::permission::{PermissionResolver, ResolvedPermissions};
    pub use crate::storage::{
        AuthStores, AuthorizationCodeStorage, ClientStorage, RefreshTokenStorage,
        RevocationStore, RoleStorage, SessionStorage, UserStorage,
    };
    pub use crate::token::{
        AccessTokenClaims, AccessTokenSigner, ExchangeCodeRequest, JwtSigner, RevocationSummary,
    };
    pub use crate::types::{
        AuthorizationCode, ClientApp, Membership, MembershipStatus, OAuthRefreshToken, Permission,
        Role, User, UserSession,
    };
}
