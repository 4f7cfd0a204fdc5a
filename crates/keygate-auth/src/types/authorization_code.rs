//! Authorization code record.
//!
//! Only the keyed hash of the code is stored. The record moves from unused to
//! used exactly once and is never updated after that.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oauth::pkce::PkceChallengeMethod;

/// A stored authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: Uuid,

    /// Keyed hash of the raw code; unique.
    pub code_hash: String,

    pub client_id: String,

    pub user_id: Uuid,

    /// Organization context the tokens will be scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,

    pub redirect_uri: String,

    /// Space-delimited granted scope.
    pub scope: String,

    pub code_challenge: String,

    pub code_challenge_method: PkceChallengeMethod,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    pub used: bool,
}

impl AuthorizationCode {
    /// Returns `true` if the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the code may still be consumed at `now`.
    #[must_use]
    pub fn is_consumable_at(&self, now: OffsetDateTime) -> bool {
        !self.used && !self.is_expired_at(now)
    }

    /// Returns `true` if `client_id` and `redirect_uri` match the stored values exactly.
    #[must_use]
    pub fn matches_request(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.client_id == client_id && self.redirect_uri == redirect_uri
    }
}
