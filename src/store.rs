//! Pending certificate store.
//!
//! In-memory keyed store with a per-entry TTL. An empty value marks a
//! request as pending; the encrypted certificate replaces it on completion.
//! Nothing survives a restart: the chain is the source of truth and entries
//! expire within half an hour anyway.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// How long entries live after their last write.
pub const ENTRY_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry {
    value: Vec<u8>,
    written_at: Instant,
}

pub struct PendingStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::with_ttl(ENTRY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Write an empty entry: the request is known but not finished.
    pub async fn mark_pending(&self, user_id: &str) {
        self.write(user_id, Vec::new()).await;
    }

    /// Write the encrypted certificate, resetting the TTL.
    pub async fn put(&self, user_id: &str, value: Vec<u8>) {
        self.write(user_id, value).await;
    }

    /// Absent, `Some(empty)` while pending, or the stored bytes. Expired
    /// entries are removed on access.
    pub async fn get(&self, user_id: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.write().await;
        match entries.get(user_id) {
            Some(entry) if entry.written_at.elapsed() > self.ttl => {
                entries.remove(user_id);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn delete(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }

    /// Drop all expired entries.
    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.written_at.elapsed() <= self.ttl);
    }

    async fn write(&self, user_id: &str, value: Vec<u8>) {
        self.entries.write().await.insert(
            user_id.to_string(),
            Entry {
                value,
                written_at: Instant::now(),
            },
        );
    }
}

impl Default for PendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_pending_then_done_then_expired() {
        let store = PendingStore::with_ttl(Duration::from_millis(50));

        assert_eq!(store.get("u1").await, None);

        store.mark_pending("u1").await;
        assert_eq!(store.get("u1").await, Some(Vec::new()));

        store.put("u1", b"ciphertext".to_vec()).await;
        assert_eq!(store.get("u1").await, Some(b"ciphertext".to_vec()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.get("u1").await, None);
    }

    #[tokio::test]
    async fn put_resets_ttl() {
        let store = PendingStore::with_ttl(Duration::from_millis(80));

        store.mark_pending("u1").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.put("u1", b"cert".to_vec()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The pending marker would have expired; the rewrite kept it alive.
        assert_eq!(store.get("u1").await, Some(b"cert".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = PendingStore::new();
        store.put("u1", b"cert".to_vec()).await;
        store.delete("u1").await;
        assert_eq!(store.get("u1").await, None);
    }

    #[tokio::test]
    async fn cleanup_sweeps_expired_entries() {
        let store = PendingStore::with_ttl(Duration::from_millis(10));
        store.put("u1", b"a".to_vec()).await;
        store.put("u2", b"b".to_vec()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.cleanup_expired().await;
        assert!(store.entries.read().await.is_empty());
    }
}
