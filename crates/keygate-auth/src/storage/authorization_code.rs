//! Authorization code storage trait.
//!
//! # Security Considerations
//!
//! - Only keyed hashes of codes are stored
//! - Consumption must be a single conditional update so that concurrent
//!   exchanges of one code yield exactly one winner

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::AuthorizationCode;

/// Result of an attempt to consume a code.
#[derive(Debug, Clone)]
pub enum CodeConsumption {
    /// The code was unused, unexpired and matched; it is now marked used.
    Consumed(AuthorizationCode),
    /// No code has this hash.
    NotFound,
    /// The code exists but expired.
    Expired,
    /// The code was already consumed.
    AlreadyUsed,
    /// The client or redirect URI differs from what was stored. The code is
    /// left untouched.
    Mismatch,
}

impl CodeConsumption {
    /// Short reason used in logs and audit details.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Consumed(_) => "consumed",
            Self::NotFound => "code not found",
            Self::Expired => "code expired",
            Self::AlreadyUsed => "code already used",
            Self::Mismatch => "client or redirect_uri mismatch",
        }
    }
}

/// Storage trait for authorization codes.
#[async_trait]
pub trait AuthorizationCodeStorage: Send + Sync {
    /// Stores a newly issued code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code hash already exists or storage fails.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Atomically marks a code used if, and only if, it is unused, unexpired
    /// at `now`, and matches `client_id` and `redirect_uri`.
    ///
    /// The check and the update must happen in one step, e.g.
    /// `UPDATE ... SET used = true WHERE code_hash = $1 AND used = false
    /// AND expires_at > $2 AND client_id = $3 AND redirect_uri = $4 RETURNING *`.
    /// When nothing was updated, implementations classify the failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        now: OffsetDateTime,
    ) -> AuthResult<CodeConsumption>;

    /// Deletes codes that expired before `now`. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
