//! Domain types of the token lifecycle engine.
//!
//! ## Domain Types
//!
//! - [`ClientApp`] - Registered OAuth client (read-only here)
//! - [`AuthorizationCode`] - Single-use PKCE-bound authorization code
//! - [`OAuthRefreshToken`] - Refresh token belonging to a rotation family
//! - [`User`] / [`Membership`] - Principals and their organization membership
//! - [`Role`] / [`Permission`] - System and organization-custom authorization model
//! - [`UserSession`] - Persisted login session

pub mod authorization_code;
pub mod client;
pub mod refresh_token;
pub mod role;
pub mod session;
pub mod user;

pub use authorization_code::AuthorizationCode;
pub use client::{ClientApp, ClientValidationError, is_valid_scope_token};
pub use refresh_token::{OAuthRefreshToken, RefreshTokenState};
pub use role::{Permission, Role, SUPERADMIN_ROLE};
pub use session::UserSession;
pub use user::{Membership, MembershipStatus, User};
