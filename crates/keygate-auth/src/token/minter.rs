//! Access and refresh token construction.
//!
//! [`TokenMinter`] is shared by first issuance and rotation so both build
//! claims the same way and both go through the permission resolver.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::context::RequestContext;
use crate::credential::{CredentialHasher, DeviceBinder};
use crate::permission::PermissionResolver;
use crate::token::claims::AccessTokenClaims;
use crate::token::jwt::AccessTokenSigner;
use crate::types::{OAuthRefreshToken, User};

/// A signed access token and the claims inside it.
#[derive(Debug, Clone)]
pub struct MintedAccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

/// A raw refresh token and the record to persist for it.
#[derive(Debug, Clone)]
pub struct MintedRefreshToken {
    /// Returned to the client once, never stored.
    pub raw: String,
    pub record: OAuthRefreshToken,
}

pub struct TokenMinter {
    signer: Arc<dyn AccessTokenSigner>,
    resolver: Arc<PermissionResolver>,
    hasher: Arc<CredentialHasher>,
    binder: Arc<DeviceBinder>,
    issuer: String,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenMinter {
    #[must_use]
    pub fn new(
        signer: Arc<dyn AccessTokenSigner>,
        resolver: Arc<PermissionResolver>,
        hasher: Arc<CredentialHasher>,
        binder: Arc<DeviceBinder>,
        issuer: impl Into<String>,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Self {
        Self {
            signer,
            resolver,
            hasher,
            binder,
            issuer: issuer.into().trim_end_matches('/').to_string(),
            access_lifetime,
            refresh_lifetime,
        }
    }

    /// Access token lifetime in seconds, as reported in `expires_in`.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.access_lifetime.whole_seconds().max(0).unsigned_abs()
    }

    /// Issuer claim for tokens issued to `client_id`.
    #[must_use]
    pub fn issuer_for(&self, client_id: &str) -> String {
        format!("{}/{}", self.issuer, client_id)
    }

    /// Resolves the user's permissions in `organization_id` and signs an access token.
    ///
    /// # Errors
    ///
    /// Returns resolver or signer errors.
    pub async fn mint_access(
        &self,
        ctx: &RequestContext,
        user: &User,
        client_id: &str,
        organization_id: Option<Uuid>,
        scope: &str,
    ) -> AuthResult<MintedAccessToken> {
        let resolved = self.resolver.resolve(ctx, user, organization_id).await?;
        let now = OffsetDateTime::now_utc();
        let claims = AccessTokenClaims {
            iss: self.issuer_for(client_id),
            sub: user.id.to_string(),
            aud: client_id.to_string(),
            exp: (now + self.access_lifetime).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            client_id: client_id.to_string(),
            roles: resolved.roles,
            permissions: resolved.permissions,
            is_superadmin: user.is_superadmin,
            org_id: organization_id,
        };
        let token = self.signer.sign(&claims)?;
        Ok(MintedAccessToken { token, claims })
    }

    /// Creates the first refresh token of a new family, bound to the request's device.
    #[must_use]
    pub fn mint_refresh(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        user_id: Uuid,
        organization_id: Option<Uuid>,
        scope: &str,
    ) -> MintedRefreshToken {
        let (raw, token_hash) = self.hasher.generate();
        let binding = self.binder.bind(ctx.user_agent(), ctx.ip());
        let now = OffsetDateTime::now_utc();
        MintedRefreshToken {
            raw,
            record: OAuthRefreshToken {
                id: Uuid::new_v4(),
                token_hash,
                family_id: Uuid::new_v4(),
                client_id: client_id.to_string(),
                user_id,
                organization_id,
                scope: scope.to_string(),
                user_agent_hash: binding.user_agent_hash,
                ip_hash: binding.ip_hash,
                created_at: now,
                expires_at: now + self.refresh_lifetime,
                revoked: false,
                used_at: None,
                replaced_by: None,
            },
        }
    }

    /// Creates the successor of `presented` in the same family.
    #[must_use]
    pub fn mint_successor(
        &self,
        presented: &OAuthRefreshToken,
        now: OffsetDateTime,
    ) -> MintedRefreshToken {
        let (raw, token_hash) = self.hasher.generate();
        MintedRefreshToken {
            raw,
            record: presented.successor(token_hash, now, self.refresh_lifetime),
        }
    }
}

impl std::fmt::Debug for TokenMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMinter")
            .field("issuer", &self.issuer)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}
