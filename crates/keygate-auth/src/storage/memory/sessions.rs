use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::AuthResult;
use crate::storage::SessionStorage;
use crate::types::UserSession;

/// In-memory login sessions.
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: DashMap<Uuid, UserSession>,
}

impl InMemorySessionStorage {
    fn delete_where(&self, predicate: impl Fn(&UserSession) -> bool) -> u64 {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !predicate(session));
        (before - self.sessions.len()) as u64
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn create(&self, session: &UserSession) -> AuthResult<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AuthResult<Vec<UserSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        Ok(self.delete_where(|s| s.user_id == user_id))
    }

    async fn delete_by_organization(&self, organization_id: Uuid) -> AuthResult<u64> {
        Ok(self.delete_where(|s| s.organization_id == Some(organization_id)))
    }

    async fn delete_by_user_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> AuthResult<u64> {
        Ok(self.delete_where(|s| {
            s.user_id == user_id && s.organization_id == Some(organization_id)
        }))
    }
}
