//! OAuth 2.0 authorization code flow.
//!
//! - [`pkce`] - S256 challenge and verifier handling
//! - [`code`] - issuance and single-use consumption of authorization codes
//! - [`response`] - token endpoint response bodies
//!
//! Token issuance itself lives in [`crate::token`].

pub mod code;
pub mod pkce;
pub mod response;

pub use code::{AuthorizationCodeManager, IssueCodeRequest};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use response::{TokenErrorResponse, TokenResponse};
