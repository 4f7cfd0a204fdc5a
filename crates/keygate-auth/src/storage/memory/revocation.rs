use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::AuthResult;
use crate::storage::RevocationStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process TTL map.
///
/// Expired entries are invisible to readers immediately and removed either
/// lazily on access or by [`InMemoryRevocationStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryRevocationStore {
    /// Removes every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Spawns a task that purges expired entries every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired revocation entries");
                }
            }
        })
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        match value {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn delete(&self, key: &str) -> AuthResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }
}
