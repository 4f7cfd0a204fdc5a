use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{RefreshTokenStorage, RotationOutcome};
use crate::types::OAuthRefreshToken;

#[derive(Default)]
struct Tokens {
    by_id: HashMap<Uuid, OAuthRefreshToken>,
    by_hash: HashMap<String, Uuid>,
}

impl Tokens {
    fn insert(&mut self, token: &OAuthRefreshToken) -> AuthResult<()> {
        if self.by_hash.contains_key(&token.token_hash) || self.by_id.contains_key(&token.id) {
            return Err(AuthError::storage("refresh token already exists"));
        }
        self.by_hash.insert(token.token_hash.clone(), token.id);
        self.by_id.insert(token.id, token.clone());
        Ok(())
    }

    fn revoke_where(&mut self, predicate: impl Fn(&OAuthRefreshToken) -> bool) -> u64 {
        let mut revoked = 0;
        for token in self.by_id.values_mut() {
            if !token.revoked && predicate(token) {
                token.revoked = true;
                revoked += 1;
            }
        }
        revoked
    }
}

/// In-memory refresh tokens.
///
/// All mutations go through one async mutex, so [`RefreshTokenStorage::rotate`]
/// is a single critical section: the used-check, the successor insert and
/// the retirement of the presented token happen together or not at all.
#[derive(Default)]
pub struct InMemoryRefreshTokenStorage {
    tokens: Mutex<Tokens>,
    fail_next_commit: AtomicBool,
}

impl InMemoryRefreshTokenStorage {
    /// Makes the next rotation fail as if its commit had failed.
    ///
    /// Nothing is written by the failing rotation.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Returns a stored token by id.
    pub async fn get(&self, id: Uuid) -> Option<OAuthRefreshToken> {
        self.tokens.lock().await.by_id.get(&id).cloned()
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create(&self, token: &OAuthRefreshToken) -> AuthResult<()> {
        self.tokens.lock().await.insert(token)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<OAuthRefreshToken>> {
        let tokens = self.tokens.lock().await;
        Ok(tokens
            .by_hash
            .get(token_hash)
            .and_then(|id| tokens.by_id.get(id))
            .cloned())
    }

    async fn find_by_family(&self, family_id: Uuid) -> AuthResult<Vec<OAuthRefreshToken>> {
        let tokens = self.tokens.lock().await;
        let mut family: Vec<_> = tokens
            .by_id
            .values()
            .filter(|t| t.family_id == family_id)
            .cloned()
            .collect();
        family.sort_by_key(|t| t.created_at);
        Ok(family)
    }

    async fn rotate(
        &self,
        presented_id: Uuid,
        successor: &OAuthRefreshToken,
        used_at: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        let mut tokens = self.tokens.lock().await;

        let Some(presented) = tokens.by_id.get(&presented_id) else {
            return Err(AuthError::storage("presented refresh token disappeared"));
        };
        if presented.revoked {
            return Ok(RotationOutcome::Revoked);
        }
        if presented.used_at.is_some() {
            return Ok(RotationOutcome::AlreadyUsed);
        }
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(AuthError::storage("commit failed"));
        }

        tokens.insert(successor)?;
        if let Some(presented) = tokens.by_id.get_mut(&presented_id) {
            presented.used_at = Some(used_at);
            presented.replaced_by = Some(successor.id);
        }
        Ok(RotationOutcome::Rotated)
    }

    async fn revoke_family(&self, family_id: Uuid) -> AuthResult<u64> {
        Ok(self
            .tokens
            .lock()
            .await
            .revoke_where(|t| t.family_id == family_id))
    }

    async fn revoke_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        Ok(self
            .tokens
            .lock()
            .await
            .revoke_where(|t| t.user_id == user_id))
    }

    async fn revoke_by_organization(&self, organization_id: Uuid) -> AuthResult<u64> {
        Ok(self
            .tokens
            .lock()
            .await
            .revoke_where(|t| t.organization_id == Some(organization_id)))
    }

    async fn revoke_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64> {
        Ok(self.tokens.lock().await.revoke_where(|t| {
            t.user_id == user_id && t.organization_id == Some(organization_id)
        }))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tokens = self.tokens.lock().await;
        let expired: Vec<(Uuid, String)> = tokens
            .by_id
            .values()
            .filter(|t| now >= t.expires_at)
            .map(|t| (t.id, t.token_hash.clone()))
            .collect();
        for (id, hash) in &expired {
            tokens.by_id.remove(id);
            tokens.by_hash.remove(hash);
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::refresh_token::sample_token;
    use time::Duration;

    #[tokio::test]
    async fn test_rotate_retires_presented_and_stores_successor() {
        let storage = InMemoryRefreshTokenStorage::default();
        let now = OffsetDateTime::now_utc();
        let first = sample_token(now);
        storage.create(&first).await.unwrap();

        let next = first.successor("next".to_string(), now, Duration::days(30));
        let outcome = storage.rotate(first.id, &next, now).await.unwrap();
        assert_eq!(outcome, RotationOutcome::Rotated);

        let retired = storage.get(first.id).await.unwrap();
        assert_eq!(retired.used_at, Some(now));
        assert_eq!(retired.replaced_by, Some(next.id));
        assert!(storage.find_by_hash("next").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_rotation_loses_without_writing() {
        let storage = InMemoryRefreshTokenStorage::default();
        let now = OffsetDateTime::now_utc();
        let first = sample_token(now);
        storage.create(&first).await.unwrap();

        let a = first.successor("a".to_string(), now, Duration::days(30));
        let b = first.successor("b".to_string(), now, Duration::days(30));
        storage.rotate(first.id, &a, now).await.unwrap();
        let outcome = storage.rotate(first.id, &b, now).await.unwrap();

        assert_eq!(outcome, RotationOutcome::AlreadyUsed);
        assert!(storage.find_by_hash("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let storage = InMemoryRefreshTokenStorage::default();
        let now = OffsetDateTime::now_utc();
        let first = sample_token(now);
        storage.create(&first).await.unwrap();
        storage.fail_next_commit();

        let next = first.successor("next".to_string(), now, Duration::days(30));
        assert!(storage.rotate(first.id, &next, now).await.is_err());
        assert!(storage.get(first.id).await.unwrap().used_at.is_none());
        assert!(storage.find_by_hash("next").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_family_reaches_all_members() {
        let storage = InMemoryRefreshTokenStorage::default();
        let now = OffsetDateTime::now_utc();
        let first = sample_token(now);
        let sibling = first.successor("sibling".to_string(), now, Duration::days(30));
        let stranger = sample_token(now);
        let mut stranger = stranger;
        stranger.token_hash = "stranger".to_string();
        storage.create(&first).await.unwrap();
        storage.create(&sibling).await.unwrap();
        storage.create(&stranger).await.unwrap();

        assert_eq!(storage.revoke_family(first.family_id).await.unwrap(), 2);
        assert!(
            storage
                .find_by_family(first.family_id)
                .await
                .unwrap()
                .iter()
                .all(|t| t.revoked)
        );
        assert!(!storage.get(stranger.id).await.unwrap().revoked);
        // Idempotent.
        assert_eq!(storage.revoke_family(first.family_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let storage = InMemoryRefreshTokenStorage::default();
        let now = OffsetDateTime::now_utc();
        let mut old = sample_token(now - Duration::days(40));
        old.expires_at = now - Duration::days(10);
        storage.create(&old).await.unwrap();

        assert_eq!(storage.cleanup_expired(now).await.unwrap(), 1);
        assert!(storage.find_by_hash(&old.token_hash).await.unwrap().is_none());
    }
}
