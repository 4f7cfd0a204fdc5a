//! Refresh token rotation with family-wide replay defense.
//!
//! # State machine
//!
//! ```text
//! ACTIVE --rotate--> USED
//! ACTIVE | USED --revoke--> REVOKED
//! ```
//!
//! Presenting a `USED` token is a replay. A replay, a device binding
//! mismatch, a lost rotation race and a failed commit all revoke the whole
//! family: an anomaly anywhere in the chain is treated as compromise of the
//! chain. At most one token per family is ever valid.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditAction, AuditDispatcher, AuditEvent};
use crate::context::RequestContext;
use crate::credential::{CredentialHasher, DeviceBinder};
use crate::error::AuthError;
use crate::oauth::response::TokenResponse;
use crate::storage::{RefreshTokenStorage, RotationOutcome, UserStorage};
use crate::token::minter::TokenMinter;
use crate::types::{OAuthRefreshToken, User};

/// Rotates refresh tokens and revokes families.
pub struct RefreshRotator {
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    users: Arc<dyn UserStorage>,
    hasher: Arc<CredentialHasher>,
    binder: Arc<DeviceBinder>,
    minter: Arc<TokenMinter>,
    audit: AuditDispatcher,
}

impl RefreshRotator {
    #[must_use]
    pub fn new(
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        users: Arc<dyn UserStorage>,
        hasher: Arc<CredentialHasher>,
        binder: Arc<DeviceBinder>,
        minter: Arc<TokenMinter>,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            refresh_tokens,
            users,
            hasher,
            binder,
            minter,
            audit,
        }
    }

    /// Exchanges a refresh token for a new access token and its successor.
    ///
    /// # Errors
    ///
    /// - `InvalidGrant` for an unknown, revoked, used, expired or foreign
    ///   token, for a principal without standing, and for a lost race
    /// - `BindingViolation` when the request comes from another device
    /// - `Transient` when the rotation could not be committed; the family
    ///   is revoked and the client must sign in again
    pub async fn refresh_access_token(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
        client_id: &str,
    ) -> AuthResult<TokenResponse> {
        let token_hash = self.hasher.hash(refresh_token);
        let presented = ctx
            .run(self.refresh_tokens.find_by_hash(&token_hash))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("refresh token not found"))?;

        if presented.revoked {
            return Err(AuthError::invalid_grant("refresh token revoked"));
        }

        if presented.used_at.is_some() {
            tracing::warn!(
                family_id = %presented.family_id,
                user_id = %presented.user_id,
                client_id = %presented.client_id,
                "Refresh token replay detected, revoking family"
            );
            self.incident(
                ctx,
                AuditAction::RefreshReplayDetected,
                &presented,
                "refresh token already used",
            );
            self.revoke_family_unconditionally(&presented).await;
            return Err(AuthError::invalid_grant(
                "refresh token already used; family revoked",
            ));
        }

        let now = OffsetDateTime::now_utc();
        if now >= presented.expires_at {
            return Err(AuthError::invalid_grant("refresh token expired"));
        }

        if presented.client_id != client_id {
            return Err(AuthError::invalid_grant("refresh token issued to another client"));
        }

        let check = self.binder.check(
            &presented.user_agent_hash,
            &presented.ip_hash,
            ctx.user_agent(),
            ctx.ip(),
        );
        if !check.is_match() {
            tracing::warn!(
                family_id = %presented.family_id,
                user_id = %presented.user_id,
                reason = check.reason(),
                "Refresh token binding violation, revoking family"
            );
            self.incident(ctx, AuditAction::BindingViolation, &presented, check.reason());
            self.revoke_family_unconditionally(&presented).await;
            return Err(AuthError::binding_violation(check.reason()));
        }

        let user = self.principal_in_good_standing(ctx, &presented).await?;

        let access = self
            .minter
            .mint_access(
                ctx,
                &user,
                &presented.client_id,
                presented.organization_id,
                &presented.scope,
            )
            .await?;

        let successor = self.minter.mint_successor(&presented, now);
        let outcome = ctx
            .run(
                self.refresh_tokens
                    .rotate(presented.id, &successor.record, now),
            )
            .await;

        match outcome {
            Ok(RotationOutcome::Rotated) => {}
            Ok(RotationOutcome::AlreadyUsed) => {
                tracing::warn!(
                    family_id = %presented.family_id,
                    user_id = %presented.user_id,
                    "Lost refresh rotation race, revoking family"
                );
                self.incident(
                    ctx,
                    AuditAction::RotationRaceLost,
                    &presented,
                    "refresh token used concurrently",
                );
                self.revoke_family_unconditionally(&presented).await;
                return Err(AuthError::invalid_grant(
                    "refresh token already used; family revoked",
                ));
            }
            Ok(RotationOutcome::Revoked) => {
                return Err(AuthError::invalid_grant("refresh token revoked"));
            }
            Err(e) if e.is_cancellation() => {
                // The rotation future was dropped before commit.
                tracing::debug!(family_id = %presented.family_id, error = %e, "Rotation cancelled");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    family_id = %presented.family_id,
                    error = %e,
                    "Refresh rotation failed to commit, revoking family"
                );
                self.audit.record(
                    AuditEvent::new(AuditAction::FamilyRevoked)
                        .actor(presented.user_id)
                        .resource(presented.family_id)
                        .detail("client_id", presented.client_id.as_str())
                        .failure(&e)
                        .request_id(ctx.request_id()),
                );
                self.revoke_family_unconditionally(&presented).await;
                return Err(AuthError::transient(format!(
                    "refresh rotation failed: {e}"
                )));
            }
        }

        tracing::debug!(
            family_id = %presented.family_id,
            user_id = %presented.user_id,
            client_id = %presented.client_id,
            "Refresh token rotated"
        );
        self.audit.record(
            AuditEvent::new(AuditAction::TokenRefreshed)
                .actor(presented.user_id)
                .resource(presented.family_id)
                .detail("client_id", presented.client_id.as_str())
                .request_id(ctx.request_id()),
        );

        Ok(TokenResponse::new(
            access.token,
            self.minter.expires_in(),
            successor.raw,
            presented.scope,
        ))
    }

    /// Revokes every token of a family. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn revoke_family(&self, ctx: &RequestContext, family_id: Uuid) -> AuthResult<u64> {
        let revoked = ctx.run(self.refresh_tokens.revoke_family(family_id)).await?;
        tracing::debug!(family_id = %family_id, revoked, "Refresh token family revoked");
        self.audit.record(
            AuditEvent::new(AuditAction::FamilyRevoked)
                .resource(family_id)
                .detail("revoked", revoked)
                .request_id(ctx.request_id()),
        );
        Ok(revoked)
    }

    /// Revokes the family of a raw refresh token, as on logout.
    ///
    /// Returns `false` for an unknown token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn revoke_refresh_token(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
    ) -> AuthResult<bool> {
        let token_hash = self.hasher.hash(refresh_token);
        match ctx
            .run(self.refresh_tokens.find_by_hash(&token_hash))
            .await?
        {
            Some(token) => {
                self.revoke_family(ctx, token.family_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes expired refresh tokens. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.refresh_tokens
            .cleanup_expired(OffsetDateTime::now_utc())
            .await
    }

    async fn principal_in_good_standing(
        &self,
        ctx: &RequestContext,
        token: &OAuthRefreshToken,
    ) -> AuthResult<User> {
        let user = ctx
            .run(self.users.get_user(token.user_id))
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| AuthError::invalid_grant("user not found or inactive"))?;

        if let Some(org_id) = token.organization_id
            && !user.is_superadmin
        {
            let membership = ctx
                .run(self.users.get_active_membership(org_id, user.id))
                .await?;
            if membership.is_none() {
                return Err(AuthError::invalid_grant("membership no longer active"));
            }
        }
        Ok(user)
    }

    /// Revokes the family outside the request's cancellation scope.
    ///
    /// Failures are logged; the caller already fails the request.
    async fn revoke_family_unconditionally(&self, token: &OAuthRefreshToken) {
        match self.refresh_tokens.revoke_family(token.family_id).await {
            Ok(revoked) => {
                tracing::debug!(family_id = %token.family_id, revoked, "Refresh token family revoked");
            }
            Err(e) => {
                tracing::error!(
                    family_id = %token.family_id,
                    error = %e,
                    "Failed to revoke refresh token family"
                );
            }
        }
    }

    fn incident(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        token: &OAuthRefreshToken,
        cause: &str,
    ) {
        self.audit.record(
            AuditEvent::new(action)
                .actor(token.user_id)
                .resource(token.family_id)
                .detail("client_id", token.client_id.as_str())
                .detail("token_id", token.id.to_string())
                .failure(cause)
                .request_id(ctx.request_id()),
        );
    }
}
