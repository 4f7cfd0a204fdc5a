use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{AuthorizationCodeStorage, CodeConsumption};
use crate::types::AuthorizationCode;

/// In-memory authorization codes keyed by hash.
///
/// Consumption holds the shard write lock for the code's key while checking
/// and flipping `used`, so concurrent consumers serialize on it.
#[derive(Default)]
pub struct InMemoryAuthorizationCodeStorage {
    codes: DashMap<String, AuthorizationCode>,
}

impl InMemoryAuthorizationCodeStorage {
    /// Number of stored codes, used or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Returns a stored code by hash.
    #[must_use]
    pub fn get(&self, code_hash: &str) -> Option<AuthorizationCode> {
        self.codes.get(code_hash).map(|c| c.clone())
    }
}

#[async_trait]
impl AuthorizationCodeStorage for InMemoryAuthorizationCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        match self.codes.entry(code.code_hash.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("authorization code hash already exists")),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn consume(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        now: OffsetDateTime,
    ) -> AuthResult<CodeConsumption> {
        let Some(mut code) = self.codes.get_mut(code_hash) else {
            return Ok(CodeConsumption::NotFound);
        };
        if code.used {
            return Ok(CodeConsumption::AlreadyUsed);
        }
        if code.is_expired_at(now) {
            return Ok(CodeConsumption::Expired);
        }
        if !code.matches_request(client_id, redirect_uri) {
            return Ok(CodeConsumption::Mismatch);
        }
        code.used = true;
        Ok(CodeConsumption::Consumed(code.clone()))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired_at(now));
        Ok((before - self.codes.len()) as u64)
    }
}
