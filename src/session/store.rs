//! Session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Session;

/// Default session timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default upper bound on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Keyed storage for conversation sessions.
///
/// Implementations must be safe to share between concurrent requests. The
/// gateway only ever reaches sessions through this trait.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Get a session by ID, creating it if it doesn't exist.
    fn checkout(&self, id: &str) -> Session;

    /// Get a session by ID without creating it.
    fn get(&self, id: &str) -> Option<Session>;

    /// Remove a session by ID. Returns whether it existed.
    fn remove(&self, id: &str) -> bool;

    /// Number of live sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions that have been idle past their timeout.
    ///
    /// Returns the number of sessions removed.
    fn evict_expired(&self) -> usize;
}

/// Bounds applied by [`InMemorySessionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Sessions beyond this count push out the least recently used one.
    pub max_sessions: usize,
    /// Idle time after which a session may be evicted.
    pub idle_ttl: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_ttl: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Thread-safe in-process session store.
///
/// Sessions with a request in flight are never evicted, so the store may
/// briefly exceed `max_sessions` when every session is busy.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    limits: StoreLimits,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

impl InMemorySessionStore {
    /// Create a new session store.
    #[must_use]
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                limits,
            }),
        }
    }
}

/// Remove the idle session with the oldest activity, if any.
fn evict_lru(sessions: &mut HashMap<String, Session>) -> Option<String> {
    let victim = sessions
        .values()
        .filter(|s| !s.is_busy())
        .min_by_key(|s| s.last_activity())
        .map(|s| s.id().to_string())?;
    sessions.remove(&victim);
    Some(victim)
}

impl SessionStore for InMemorySessionStore {
    fn checkout(&self, id: &str) -> Session {
        // Try read-only first
        {
            let guard = self
                .inner
                .sessions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(session) = guard.get(id) {
                session.touch();
                return session.clone();
            }
        }

        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another request may have created it between the two locks.
        if let Some(session) = guard.get(id) {
            session.touch();
            return session.clone();
        }

        if guard.len() >= self.inner.limits.max_sessions {
            match evict_lru(&mut guard) {
                Some(evicted) => tracing::info!(
                    name: "session.evicted",
                    session_id = %evicted,
                    reason = "capacity",
                    "Evicted least recently used session"
                ),
                None => tracing::warn!(
                    name: "session.capacity.exceeded",
                    sessions = guard.len(),
                    "All sessions busy; store above capacity"
                ),
            }
        }

        let session = Session::new(id.to_string());
        guard.insert(id.to_string(), session.clone());
        tracing::debug!(name: "session.created", session_id = %id, "Session created");
        session
    }

    fn get(&self, id: &str) -> Option<Session> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned()
    }

    fn remove(&self, id: &str) -> bool {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn evict_expired(&self) -> usize {
        let ttl = self.inner.limits.idle_ttl;
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| session.is_busy() || !session.is_expired_with_timeout(ttl));
        let removed = before - guard.len();

        if removed > 0 {
            tracing::info!(
                name: "session.evicted",
                count = removed,
                reason = "idle",
                "Evicted idle sessions"
            );
        }
        removed
    }
}

/// Periodically evict idle sessions until the runtime shuts down.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            store.evict_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn limits(max_sessions: usize, ttl_secs: u64) -> StoreLimits {
        StoreLimits {
            max_sessions,
            idle_ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[tokio::test]
    async fn test_session_store() {
        let store = InMemorySessionStore::default();
        assert!(store.is_empty());
        assert!(store.get("abc").is_none());

        let session = store.checkout("abc");
        assert_eq!(store.len(), 1);
        session.lock().await.append(Message::user("Hello"));

        let retrieved = store.get("abc").unwrap();
        assert_eq!(retrieved.id(), "abc");
        assert_eq!(retrieved.messages().await, vec![Message::user("Hello")]);

        assert!(store.remove("abc"));
        assert!(!store.remove("abc"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_reuses_existing_session() {
        let store = InMemorySessionStore::default();
        store.checkout("same").lock().await.append(Message::user("one"));
        store.checkout("same").lock().await.append(Message::user("two"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("same").unwrap().messages().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let store = InMemorySessionStore::new(limits(100, 60));
        drop(store.checkout("old"));

        tokio::time::advance(Duration::from_secs(45)).await;
        drop(store.checkout("fresh"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.evict_expired(), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_session_survives_expiry() {
        let store = InMemorySessionStore::new(limits(100, 60));
        let held = store.checkout("busy");

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(store.evict_expired(), 0);

        drop(held);
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let store = InMemorySessionStore::new(limits(2, 3600));
        drop(store.checkout("a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(store.checkout("b"));
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touch "a" so "b" becomes the oldest.
        drop(store.checkout("a"));
        tokio::time::advance(Duration::from_secs(1)).await;

        drop(store.checkout("c"));
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }

    #[tokio::test]
    async fn test_capacity_overflows_when_all_busy() {
        let store = InMemorySessionStore::new(limits(1, 3600));
        let _held = store.checkout("a");
        let _other = store.checkout("b");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let store = InMemorySessionStore::new(limits(100, 10));
        drop(store.checkout("idle"));

        let handle = spawn_sweeper(Arc::new(store.clone()), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}
