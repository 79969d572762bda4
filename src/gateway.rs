//! Conversation gateway.
//!
//! Ties a [`SessionStore`] to a [`CompletionProvider`]: each call records the
//! user's query in its session, asks the provider for the next turn over the
//! whole log, records the reply and cuts the log back to its window.

use std::sync::Arc;

use uuid::Uuid;

use crate::llm::{CompletionProvider, Message, ProviderError};
use crate::session::{SessionStore, TrimMode};

/// Default number of messages kept per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// How much history a session keeps after each exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub limit: usize,
    pub mode: TrimMode,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            mode: TrimMode::Pairwise,
        }
    }
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// The assistant's reply.
    pub response: String,
    /// Session the exchange was recorded in.
    pub session_id: String,
    /// The session's log as stored after the exchange.
    pub history: Vec<Message>,
}

/// Errors returned by [`Gateway::handle`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The completion provider failed; the user turn stays recorded.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),

    /// Anything else that went wrong while serving the exchange.
    #[error("internal fault: {0}")]
    Internal(String),
}

/// The conversation gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    policy: HistoryPolicy,
}

impl Gateway {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn CompletionProvider>,
        policy: HistoryPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one exchange for `query` in the given session.
    ///
    /// A missing or empty `session_id` starts a new session under a fresh
    /// UUID. The exchange runs on its own task: once started it completes
    /// even if the caller stops waiting, so the session never keeps a
    /// half-recorded turn because of a dropped connection.
    pub async fn handle(
        &self,
        query: String,
        session_id: Option<String>,
    ) -> Result<Exchange, GatewayError> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let gateway = self.clone();
        tokio::spawn(async move { gateway.exchange(query, session_id).await })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?
    }

    async fn exchange(&self, query: String, session_id: String) -> Result<Exchange, GatewayError> {
        let session = self.store.checkout(&session_id);
        let mut log = session.lock().await;

        log.append(Message::user(query));

        tracing::debug!(
            session_id = %session_id,
            message_count = log.len(),
            "Requesting completion"
        );

        let reply = match self.provider.complete(log.as_slice()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    name: "gateway.provider.failed",
                    session_id = %session_id,
                    error = %e,
                    "Completion provider failed"
                );
                return Err(GatewayError::ProviderUnavailable(e));
            }
        };

        log.append(Message::assistant(reply.clone()));
        let trimmed = log.trim(self.policy.limit, self.policy.mode);
        let history = log.messages();
        drop(log);

        tracing::info!(
            name: "gateway.exchange.completed",
            session_id = %session_id,
            history_len = history.len(),
            trimmed,
            reply_len = reply.len(),
            "Exchange completed"
        );

        Ok(Exchange {
            response: reply,
            session_id,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::{MessageRole, ScriptedProvider};
    use crate::session::{InMemorySessionStore, StoreLimits};

    fn gateway_with(provider: Arc<ScriptedProvider>) -> (Gateway, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::default());
        let gateway = Gateway::new(store.clone(), provider, HistoryPolicy::default());
        (gateway, store)
    }

    #[tokio::test]
    async fn test_first_call_creates_session() {
        let provider = Arc::new(ScriptedProvider::replying("Hi there"));
        let (gateway, _store) = gateway_with(Arc::clone(&provider));

        let exchange = gateway.handle("Hello".to_string(), None).await.unwrap();

        assert_eq!(exchange.response, "Hi there");
        assert!(Uuid::parse_str(&exchange.session_id).is_ok());
        assert_eq!(
            exchange.history,
            vec![Message::user("Hello"), Message::assistant("Hi there")]
        );
        assert_eq!(provider.calls(), vec![vec![Message::user("Hello")]]);
    }

    #[tokio::test]
    async fn test_empty_session_id_is_treated_as_absent() {
        let (gateway, _store) = gateway_with(Arc::new(ScriptedProvider::echo()));

        let exchange = gateway
            .handle("Hello".to_string(), Some(String::new()))
            .await
            .unwrap();
        assert!(!exchange.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_reused_id_shares_history() {
        let provider = Arc::new(ScriptedProvider::echo());
        let (gateway, _store) = gateway_with(Arc::clone(&provider));

        let first = gateway.handle("one".to_string(), None).await.unwrap();
        let second = gateway
            .handle("two".to_string(), Some(first.session_id.clone()))
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.history.len(), 4);
        assert_eq!(second.history[..2], first.history[..]);
        // The provider saw the whole log, oldest first.
        assert_eq!(provider.calls()[1].len(), 3);
    }

    #[tokio::test]
    async fn test_history_is_bounded_suffix() {
        let (gateway, store) = gateway_with(Arc::new(ScriptedProvider::echo()));
        let mut full = Vec::new();

        for n in 0..12 {
            let query = format!("q{n}");
            let exchange = gateway
                .handle(query.clone(), Some("s".to_string()))
                .await
                .unwrap();
            full.push(Message::user(query));
            full.push(Message::assistant(exchange.response.clone()));

            assert!(exchange.history.len() <= DEFAULT_HISTORY_LIMIT);
            assert!(full.ends_with(&exchange.history));
            assert_eq!(
                exchange.history,
                store.get("s").unwrap().messages().await
            );
        }
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_user_turn() {
        let provider = Arc::new(ScriptedProvider::failing("upstream exploded"));
        let (gateway, store) = gateway_with(provider);

        let err = gateway
            .handle("Hello".to_string(), Some("s".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable(_)));

        let stored = store.get("s").unwrap().messages().await;
        assert_eq!(stored, vec![Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_failed_turn_is_sent_as_context_next_time() {
        let provider = Arc::new(ScriptedProvider::echo().then_fail("down"));
        let (gateway, _store) = gateway_with(Arc::clone(&provider));

        assert!(
            gateway
                .handle("lost".to_string(), Some("s".to_string()))
                .await
                .is_err()
        );
        let exchange = gateway
            .handle("again".to_string(), Some("s".to_string()))
            .await
            .unwrap();

        let roles: Vec<_> = exchange.history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::User, MessageRole::Assistant]
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_on_one_session_lose_nothing() {
        let provider =
            Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(20)));
        let store = Arc::new(InMemorySessionStore::default());
        let gateway = Gateway::new(
            store.clone(),
            provider,
            HistoryPolicy {
                limit: 100,
                mode: TrimMode::Pairwise,
            },
        );

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .handle(format!("q{n}"), Some("shared".to_string()))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = store.get("shared").unwrap().messages().await;
        assert_eq!(stored.len(), 16);
        for pair in stored.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_exchange_leaves_session_fresh() {
        let provider =
            Arc::new(ScriptedProvider::echo().with_delay(Duration::from_secs(90)));
        let store = Arc::new(InMemorySessionStore::new(StoreLimits {
            max_sessions: 100,
            idle_ttl: Duration::from_secs(60),
        }));
        let gateway = Gateway::new(store.clone(), provider, HistoryPolicy::default());

        gateway
            .handle("hi".to_string(), Some("s".to_string()))
            .await
            .unwrap();

        assert_eq!(store.evict_expired(), 0);
        assert_eq!(store.get("s").unwrap().messages().await.len(), 2);
    }
}
