//! Refresh token record.
//!
//! # Security
//!
//! - Only the keyed hash of the token is persisted, never the plaintext
//! - Every token belongs to a family shared by all descendants of one grant
//! - Binding hashes are fixed at creation and copied to successors unchanged

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenState {
    /// May be rotated.
    Active,
    /// Already rotated; presenting it again is a replay.
    Used,
    /// Revoked, individually or with its family.
    Revoked,
    /// Past its expiry.
    Expired,
}

/// A stored refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthRefreshToken {
    pub id: Uuid,

    /// Keyed hash of the raw token value.
    pub token_hash: String,

    /// Rotation family shared with every token descended from the same grant.
    pub family_id: Uuid,

    pub client_id: String,

    pub user_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,

    pub scope: String,

    /// Salted hash of the issuing request's user agent.
    pub user_agent_hash: String,

    /// Salted hash of the issuing request's (normalized) IP.
    pub ip_hash: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    pub revoked: bool,

    /// Set once, when the token is rotated.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub used_at: Option<OffsetDateTime>,

    /// Id of the successor created by rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<Uuid>,
}

impl OAuthRefreshToken {
    /// Returns the token state at `now`.
    ///
    /// Revocation takes precedence over use, and use over expiry, so a
    /// replayed token is still reported as [`RefreshTokenState::Used`] after
    /// it expires.
    #[must_use]
    pub fn state_at(&self, now: OffsetDateTime) -> RefreshTokenState {
        if self.revoked {
            RefreshTokenState::Revoked
        } else if self.used_at.is_some() {
            RefreshTokenState::Used
        } else if now >= self.expires_at {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Active
        }
    }

    /// Returns `true` if the token may be rotated at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.state_at(now) == RefreshTokenState::Active
    }

    /// Builds the successor of this token within the same family.
    ///
    /// Binding hashes, client, user, organization and scope are copied; the
    /// expiry window restarts at `now`.
    #[must_use]
    pub fn successor(
        &self,
        token_hash: String,
        now: OffsetDateTime,
        lifetime: time::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash,
            family_id: self.family_id,
            client_id: self.client_id.clone(),
            user_id: self.user_id,
            organization_id: self.organization_id,
            scope: self.scope.clone(),
            user_agent_hash: self.user_agent_hash.clone(),
            ip_hash: self.ip_hash.clone(),
            created_at: now,
            expires_at: now + lifetime,
            revoked: false,
            used_at: None,
            replaced_by: None,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_token(now: OffsetDateTime) -> OAuthRefreshToken {
    OAuthRefreshToken {
        id: Uuid::new_v4(),
        token_hash: "hash".to_string(),
        family_id: Uuid::new_v4(),
        client_id: "c1".to_string(),
        user_id: Uuid::new_v4(),
        organization_id: None,
        scope: "profile".to_string(),
        user_agent_hash: "ua".to_string(),
        ip_hash: "ip".to_string(),
        created_at: now,
        expires_at: now + time::Duration::days(30),
        revoked: false,
        used_at: None,
        replaced_by: None,
    }
}
