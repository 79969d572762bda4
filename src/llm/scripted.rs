//! Scripted in-process provider.
//!
//! Test double for a real LLM, used by the crate's unit and integration
//! tests; the server binary never builds one. Replies come from a
//! queue of canned outcomes, then from a fixed fallback behavior. Every
//! conversation it receives is recorded.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{CompletionProvider, Message, ProviderError};

#[derive(Debug, Clone)]
enum Outcome {
    /// Reply with `echo: <last message>`.
    Echo,
    Reply(String),
    Fail(String),
}

/// A [`CompletionProvider`] that follows a script instead of calling out.
#[derive(Debug)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn with_fallback(fallback: Outcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `echo: <content of the newest message>`.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_fallback(Outcome::Echo)
    }

    /// Always answer with `reply`.
    #[must_use]
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_fallback(Outcome::Reply(reply.into()))
    }

    /// Always fail with an upstream 500 carrying `detail`.
    #[must_use]
    pub fn failing(detail: impl Into<String>) -> Self {
        Self::with_fallback(Outcome::Fail(detail.into()))
    }

    /// Queue a one-off reply ahead of the fallback.
    #[must_use]
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(Outcome::Reply(reply.into()))
    }

    /// Queue a one-off failure ahead of the fallback.
    #[must_use]
    pub fn then_fail(self, detail: impl Into<String>) -> Self {
        self.push(Outcome::Fail(detail.into()))
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, outcome: Outcome) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }

    /// Conversations received so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            Outcome::Echo => {
                let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
                Ok(format!("echo: {last}"))
            }
            Outcome::Reply(reply) => Ok(reply),
            Outcome::Fail(detail) => Err(ProviderError::Status {
                status: 500,
                body: detail,
            }),
        }
    }
}
