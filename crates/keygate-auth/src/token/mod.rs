//! Token issuance, rotation and revocation.
//!
//! - [`claims`] - access token claim set
//! - [`jwt`] - the signing seam and its `jsonwebtoken` implementation
//! - [`minter`] - builds access and refresh tokens for both issuance paths
//! - [`issuer`] - authorization code exchange
//! - [`rotation`] - refresh token rotation with replay defense
//! - [`revocation`] - denylist and session revocation markers

pub mod claims;
pub mod issuer;
pub mod jwt;
pub mod minter;
pub mod revocation;
pub mod rotation;

pub use claims::{AccessTokenClaims, UnverifiedClaims};
pub use issuer::{ExchangeCodeRequest, TokenIssuer};
pub use jwt::{AccessTokenSigner, JwtError, JwtSigner, SigningAlgorithm, decode_unverified_claims};
pub use minter::{MintedAccessToken, MintedRefreshToken, TokenMinter};
pub use revocation::{RevocationService, RevocationSummary};
pub use rotation::RefreshRotator;
