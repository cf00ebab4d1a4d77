//! Server-side stash of the selected ids between wizard steps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Key under which a selection is stored: `session-` plus the hex digest
/// of the comma-joined ids. The same selection always maps to the same key.
pub fn session_key(ids: &[i64]) -> String {
    let joined = join_ids(ids);
    let digest = Sha256::digest(joined.as_bytes());
    format!("session-{:x}", digest)
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

fn parse_ids(joined: &str) -> Option<Vec<i64>> {
    joined.split(',').map(|id| id.trim().parse::<i64>().ok()).collect()
}

/// Lifetime of an unfinished selection
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct Entry {
    ids: String,
    stored_at: Instant,
}

/// Selections stored per user, so one staff member cannot read another's.
/// Entries expire after the TTL and are swept on every stash.
#[derive(Debug)]
pub struct SessionStore {
    entries: RwLock<HashMap<(String, String), Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    /// Store `ids` for `user` and return the key
    pub async fn stash(&self, user: &str, ids: &[i64]) -> String {
        let key = session_key(ids);
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        if entries.len() < before {
            tracing::debug!("Swept {} expired selections", before - entries.len());
        }
        entries.insert((user.to_string(), key.clone()), Entry { ids: join_ids(ids), stored_at: now });

        tracing::debug!("Stashed {} ids for {} under {}", ids.len(), user, key);
        key
    }

    /// The ids stored under `key`, when present, unexpired and well-formed
    pub async fn load(&self, user: &str, key: &str) -> Option<Vec<i64>> {
        let entries = self.entries.read().await;
        let entry = entries.get(&(user.to_string(), key.to_string()))?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        parse_ids(&entry.ids)
    }

    pub async fn remove(&self, user: &str, key: &str) {
        self.entries.write().await.remove(&(user.to_string(), key.to_string()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_content_addressed() {
        assert_eq!(session_key(&[1, 2, 3]), session_key(&[1, 2, 3]));
        assert_ne!(session_key(&[1, 2, 3]), session_key(&[1, 2, 4]));
        assert!(session_key(&[7]).starts_with("session-"));
        assert_eq!(session_key(&[7]).len(), "session-".len() + 64);
    }

    #[tokio::test]
    async fn selections_are_scoped_per_user() {
        let sessions = SessionStore::new();
        let key = sessions.stash("alice", &[3, 1, 2]).await;

        assert_eq!(sessions.load("alice", &key).await, Some(vec![3, 1, 2]));
        assert_eq!(sessions.load("bob", &key).await, None);

        sessions.remove("alice", &key).await;
        assert_eq!(sessions.load("alice", &key).await, None);
    }

    #[tokio::test]
    async fn expired_selections_are_swept_on_stash() {
        let sessions = SessionStore::with_ttl(Duration::from_millis(20));
        let old = sessions.stash("alice", &[1, 2]).await;
        sessions.stash("bob", &[3]).await;
        assert_eq!(sessions.len().await, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sessions.load("alice", &old).await, None);

        let fresh = sessions.stash("alice", &[4]).await;
        assert_eq!(sessions.len().await, 1);
        assert_eq!(sessions.load("alice", &fresh).await, Some(vec![4]));
    }

    #[tokio::test]
    async fn many_selections_do_not_accumulate_past_the_ttl() {
        let sessions = SessionStore::with_ttl(Duration::from_millis(20));
        for id in 0..1_000 {
            sessions.stash("alice", &[id]).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        sessions.stash("alice", &[1]).await;
        assert_eq!(sessions.len().await, 1);
    }
}
