//! `OpenAI` Chat Completions API driver.
//!
//! This module implements the [`CompletionProvider`] trait for the `OpenAI`
//! Chat Completions API (`/v1/chat/completions`) and compatible services,
//! using a single non-streaming request per reply.

use serde::Deserialize;

use super::{CompletionProvider, LlmSettings, Message, ProviderError};

/// Longest slice of an upstream error body kept for logging.
const MAX_ERROR_BODY: usize = 512;

/// Driver for the `OpenAI` Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    url: String,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("url", &self.url)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(settings: LlmSettings) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            url: settings.provider.build_chat_url(&settings.base_url),
            settings,
        })
    }

    /// The endpoint this driver posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl CompletionProvider for ChatCompletionsDriver {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        tracing::debug!(
            url = %self.url,
            message_count = messages.len(),
            "Sending chat completion request"
        );

        let rb = self.http.post(&self.url).json(&body);
        let resp = self
            .settings
            .provider
            .authorize(rb, &self.settings.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = body
                    .char_indices()
                    .map(|(i, _)| i)
                    .take_while(|i| *i <= MAX_ERROR_BODY)
                    .last()
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: CompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?
            .message
            .content
            .ok_or_else(|| ProviderError::Malformed("choice has no content".to_string()))
    }
}
