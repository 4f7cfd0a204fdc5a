//! Access token denylist and session revocation markers.
//!
//! # Keys
//!
//! All keys live under the configured prefix (default `keygate:revoked`):
//!
//! - `{prefix}:jti:{jti}` - one revoked access token, kept until it would have expired
//! - `{prefix}:user:{user_id}` - every token of a user issued at or before the marker
//! - `{prefix}:org:{org_id}` - every token scoped to an organization
//! - `{prefix}:user_org:{user_id}:{org_id}` - a user's tokens in one organization
//!
//! Session markers hold the Unix timestamp of the revocation. Expiry is left
//! entirely to the store's TTL.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditAction, AuditDispatcher, AuditEvent};
use crate::config::RevocationConfig;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::storage::{RefreshTokenStorage, RevocationStore, SessionStorage};
use crate::token::claims::AccessTokenClaims;
use crate::token::jwt::decode_unverified_claims;

/// What a session revocation removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevocationSummary {
    pub sessions_deleted: u64,
    pub refresh_tokens_revoked: u64,
}

/// Maintains revocation markers in a TTL store.
pub struct RevocationService {
    store: Arc<dyn RevocationStore>,
    sessions: Arc<dyn SessionStorage>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    config: RevocationConfig,
    audit: AuditDispatcher,
}

impl RevocationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn RevocationStore>,
        sessions: Arc<dyn SessionStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        config: RevocationConfig,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            store,
            sessions,
            refresh_tokens,
            config,
            audit,
        }
    }

    fn jti_key(&self, jti: &str) -> String {
        format!("{}:jti:{jti}", self.config.key_prefix)
    }

    fn user_key(&self, user_id: Uuid) -> String {
        format!("{}:user:{user_id}", self.config.key_prefix)
    }

    fn org_key(&self, org_id: Uuid) -> String {
        format!("{}:org:{org_id}", self.config.key_prefix)
    }

    fn user_org_key(&self, user_id: Uuid, org_id: Uuid) -> String {
        format!("{}:user_org:{user_id}:{org_id}", self.config.key_prefix)
    }

    /// Denylists one access token until it would have expired.
    ///
    /// A token without `exp` is denylisted for the fallback TTL. An already
    /// expired token needs no marker. No entry outlives `max_denylist_ttl`.
    ///
    /// The token is not verified. Callers must authenticate whoever supplied
    /// it, or verify it first: a forged payload can name any `jti`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token cannot be parsed or has no `jti`,
    /// or a storage error.
    pub async fn revoke_token(&self, ctx: &RequestContext, token: &str) -> AuthResult<()> {
        let claims = decode_unverified_claims(token)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?;
        let jti = claims
            .jti
            .filter(|j| !j.is_empty())
            .ok_or_else(|| AuthError::invalid_token("token has no jti"))?;

        let now = OffsetDateTime::now_utc();
        let ttl = match claims.exp {
            Some(exp) => {
                // `exp` is unverified, so extreme values must not overflow.
                let remaining = exp.saturating_sub(now.unix_timestamp());
                if remaining <= 0 {
                    tracing::debug!(jti = %jti, "Token already expired, no denylist entry needed");
                    return Ok(());
                }
                Duration::from_secs(remaining.unsigned_abs())
            }
            None => self.config.fallback_ttl,
        }
        .min(self.config.max_denylist_ttl);

        ctx.run(self.store.set_with_ttl(
            &self.jti_key(&jti),
            &now.unix_timestamp().to_string(),
            ttl,
        ))
        .await?;

        tracing::debug!(jti = %jti, ttl_secs = ttl.as_secs(), "Access token revoked");
        let mut event = AuditEvent::new(AuditAction::TokenRevoked)
            .resource(&jti)
            .request_id(ctx.request_id());
        if let Some(sub) = claims.sub {
            event = event.actor(sub);
        }
        self.audit.record(event);
        Ok(())
    }

    /// Removes a token from the denylist. Returns `true` if it was listed.
    ///
    /// Like [`RevocationService::revoke_token`], the token is not verified;
    /// only trusted administrative callers may reach this.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token cannot be parsed, or a storage error.
    pub async fn unrevoke_token(&self, ctx: &RequestContext, token: &str) -> AuthResult<bool> {
        let jti = decode_unverified_claims(token)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?
            .jti
            .ok_or_else(|| AuthError::invalid_token("token has no jti"))?;
        let removed = ctx.run(self.store.delete(&self.jti_key(&jti))).await?;
        tracing::debug!(jti = %jti, removed, "Access token removed from denylist");
        Ok(removed)
    }

    /// Returns `true` if the token is denylisted.
    ///
    /// A token that cannot be parsed, or has no `jti`, is reported as revoked.
    ///
    /// # Errors
    ///
    /// Returns a storage error; callers must then reject the token.
    pub async fn is_token_revoked(&self, ctx: &RequestContext, token: &str) -> AuthResult<bool> {
        let jti = match decode_unverified_claims(token) {
            Ok(claims) => match claims.jti.filter(|j| !j.is_empty()) {
                Some(jti) => jti,
                None => return Ok(true),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable token treated as revoked");
                return Ok(true);
            }
        };
        ctx.run(self.store.exists(&self.jti_key(&jti))).await
    }

    /// Full revocation check for a verified access token.
    ///
    /// Checks the jti denylist, then the user, organization and
    /// user-in-organization markers. A token issued at or before a marker's
    /// timestamp is revoked. Marker timestamps have one-second resolution, so
    /// a token issued in the same second as the revocation is rejected too.
    ///
    /// # Errors
    ///
    /// Returns a storage error; callers must then reject the token.
    pub async fn is_access_revoked(
        &self,
        ctx: &RequestContext,
        claims: &AccessTokenClaims,
    ) -> AuthResult<bool> {
        if claims.jti.is_empty() || ctx.run(self.store.exists(&self.jti_key(&claims.jti))).await?
        {
            return Ok(true);
        }

        let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
            return Ok(true);
        };

        let mut keys = vec![self.user_key(user_id)];
        if let Some(org_id) = claims.org_id {
            keys.push(self.org_key(org_id));
            keys.push(self.user_org_key(user_id, org_id));
        }

        for key in keys {
            if let Some(marker) = ctx.run(self.store.get(&key)).await? {
                match marker.parse::<i64>() {
                    Ok(revoked_at) if claims.iat <= revoked_at => return Ok(true),
                    Ok(_) => {}
                    Err(_) => {
                        tracing::warn!(key = %key, "Malformed revocation marker, failing closed");
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Ends every session of a user.
    ///
    /// Deletes the user's sessions, revokes their refresh tokens and sets a
    /// user marker that rejects previously issued access tokens.
    ///
    /// # Errors
    ///
    /// Returns a storage error. Steps already done stay done; repeating the
    /// call is safe.
    pub async fn revoke_user_sessions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        let summary = RevocationSummary {
            sessions_deleted: ctx.run(self.sessions.delete_by_user(user_id)).await?,
            refresh_tokens_revoked: ctx.run(self.refresh_tokens.revoke_by_user(user_id)).await?,
        };
        self.set_marker(ctx, &self.user_key(user_id)).await?;

        tracing::info!(
            user_id = %user_id,
            sessions = summary.sessions_deleted,
            refresh_tokens = summary.refresh_tokens_revoked,
            "User sessions revoked"
        );
        self.record(
            ctx,
            AuditEvent::new(AuditAction::UserSessionsRevoked).resource(user_id),
            summary,
        );
        Ok(summary)
    }

    /// Ends every session opened in an organization.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn revoke_org_sessions(
        &self,
        ctx: &RequestContext,
        org_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        let summary = RevocationSummary {
            sessions_deleted: ctx.run(self.sessions.delete_by_organization(org_id)).await?,
            refresh_tokens_revoked: ctx
                .run(self.refresh_tokens.revoke_by_organization(org_id))
                .await?,
        };
        self.set_marker(ctx, &self.org_key(org_id)).await?;

        tracing::info!(
            org_id = %org_id,
            sessions = summary.sessions_deleted,
            refresh_tokens = summary.refresh_tokens_revoked,
            "Organization sessions revoked"
        );
        self.record(
            ctx,
            AuditEvent::new(AuditAction::OrgSessionsRevoked).resource(org_id),
            summary,
        );
        Ok(summary)
    }

    /// Ends a user's sessions in one organization, leaving their other
    /// organizations untouched.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn revoke_user_in_org(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        org_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        let summary = RevocationSummary {
            sessions_deleted: ctx
                .run(self.sessions.delete_by_user_in_organization(user_id, org_id))
                .await?,
            refresh_tokens_revoked: ctx
                .run(
                    self.refresh_tokens
                        .revoke_by_user_in_organization(user_id, org_id),
                )
                .await?,
        };
        self.set_marker(ctx, &self.user_org_key(user_id, org_id))
            .await?;

        tracing::info!(
            user_id = %user_id,
            org_id = %org_id,
            sessions = summary.sessions_deleted,
            refresh_tokens = summary.refresh_tokens_revoked,
            "User sessions revoked in organization"
        );
        self.record(
            ctx,
            AuditEvent::new(AuditAction::UserInOrgRevoked)
                .resource(user_id)
                .detail("org_id", org_id.to_string()),
            summary,
        );
        Ok(summary)
    }

    async fn set_marker(&self, ctx: &RequestContext, key: &str) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp().to_string();
        ctx.run(
            self.store
                .set_with_ttl(key, &now, self.config.session_marker_ttl),
        )
        .await
    }

    fn record(&self, ctx: &RequestContext, event: AuditEvent, summary: RevocationSummary) {
        self.audit.record(
            event
                .detail("sessions_deleted", summary.sessions_deleted)
                .detail("refresh_tokens_revoked", summary.refresh_tokens_revoked)
                .request_id(ctx.request_id()),
        );
    }
}
