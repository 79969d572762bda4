//! LLM provider traits and implementations.
//!
//! This module provides the abstraction the gateway uses to obtain the next
//! assistant turn for a conversation, plus an implementation for
//! `OpenAI`-compatible Chat Completions APIs.
//!
//! # Overview
//!
//! The [`CompletionProvider`] trait is the seam between the gateway and the
//! outside world: given the full message log it returns a single reply.
//! [`ChatCompletionsDriver`] implements it over HTTP; [`ScriptedProvider`]
//! is a test double that answers from a canned script.
//!
//! # Example
//!
//! ```rust,ignore
//! use ask_gateway::llm::{ChatCompletionsDriver, LlmSettings, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: "sk-...".to_string(),
//!     model: "gpt-3.5-turbo".to_string(),
//!     provider: Provider::OpenAI,
//!     temperature: DEFAULT_TEMPERATURE,
//!     max_tokens: DEFAULT_MAX_TOKENS,
//!     timeout: None,
//! };
//! let driver = ChatCompletionsDriver::new(settings)?;
//! ```

pub mod chat_completions;
pub mod provider;
pub mod scripted;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;
pub use scripted::ScriptedProvider;

use std::time::Duration;

/// Sampling temperature sent with every completion request.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Upper bound on generated tokens per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Model used when `LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier (e.g., `gpt-3.5-turbo`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of tokens in a reply.
    pub max_tokens: u32,
    /// Optional per-request timeout for the HTTP client.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Errors raised by a [`CompletionProvider`].
///
/// The `Display` output may contain upstream detail and is meant for logs
/// only; callers of the HTTP API never see it.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the provider.
        body: String,
    },

    /// The response could not be interpreted as a completion.
    #[error("malformed completion: {0}")]
    Malformed(String),
}

/// Trait for chat-completion providers.
///
/// Implementations receive the entire conversation, oldest message first,
/// and return the text of the next assistant turn.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync + std::fmt::Debug {
    /// Request a single reply for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the request fails, the provider answers
    /// with an error status, or the reply cannot be parsed.
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError>;
}
