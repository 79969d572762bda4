//! Conversation thread: a single session's message log.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::MutexGuard;
use tokio::time::Instant;

use crate::llm::{Message, MessageRole};

/// How a history that outgrew its window is cut back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimMode {
    /// Keep the newest entries, then drop any leading assistant turns so the
    /// history never opens with a reply whose question was cut away.
    #[default]
    Pairwise,
    /// Keep exactly the newest `limit` entries.
    Exact,
}

/// A single conversation session.
///
/// `Session` is a cheap handle; clones share the same message log. Access
/// to the log goes through [`Session::lock`], which serializes concurrent
/// requests on the same session.
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Unique session identifier.
    id: String,
    /// Conversation messages, oldest first.
    messages: tokio::sync::Mutex<Vec<Message>>,
    /// Last activity time.
    last_activity: Mutex<Instant>,
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Session {
    /// Create a new, empty session with the given ID.
    pub(crate) fn new(id: String) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                messages: tokio::sync::Mutex::new(Vec::new()),
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Take exclusive access to the message log.
    ///
    /// The guard may be held across `.await` points; other requests for the
    /// same session wait until it is dropped. Activity is recorded both when
    /// the lock is taken and when the guard is released.
    pub async fn lock(&self) -> SessionGuard<'_> {
        let messages = self.inner.messages.lock().await;
        self.touch();
        SessionGuard {
            session: self,
            messages,
        }
    }

    /// Copy of the current message log.
    pub async fn messages(&self) -> Vec<Message> {
        self.inner.messages.lock().await.clone()
    }

    /// Update the last activity timestamp.
    pub(crate) fn touch(&self) {
        *self
            .inner
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn last_activity(&self) -> Instant {
        *self
            .inner
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the session has been idle for longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        self.last_activity().elapsed() > timeout
    }

    /// Whether any handle besides the store's own is alive, i.e. a request
    /// is currently working on this session.
    pub(crate) fn is_busy(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }
}

/// Exclusive access to a session's message log.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
    messages: MutexGuard<'a, Vec<Message>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.touch();
    }
}

impl SessionGuard<'_> {
    /// The log, oldest message first.
    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Copy of the log.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Append a message to the end of the log.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Cut the log back to at most `limit` entries, keeping the newest.
    ///
    /// Logs already within the limit are left untouched. Returns the number
    /// of messages removed.
    pub fn trim(&mut self, limit: usize, mode: TrimMode) -> usize {
        let before = self.messages.len();
        if before <= limit {
            return 0;
        }

        self.messages.drain(..before - limit);

        if mode == TrimMode::Pairwise {
            let orphaned = self
                .messages
                .iter()
                .take_while(|m| m.role == MessageRole::Assistant)
                .count();
            self.messages.drain(..orphaned);
        }

        before - self.messages.len()
    }
}
