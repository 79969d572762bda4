//! Ask Gateway
//!
//! A small HTTP service that forwards user questions to a chat-completion
//! provider and keeps a short rolling conversation per session.
//!
//! # Architecture
//!
//! - **Server**: Axum router exposing `POST /ask`, with CORS and request tracing
//! - **Gateway**: Records each exchange in its session and asks the provider
//!   for the next turn
//! - **Sessions**: Per-session locked, evicting in-memory store
//! - **LLM**: Provider trait plus an `OpenAI`-compatible Chat Completions driver
//!
//! # Modules
//!
//! - [`config`]: Layered server configuration and LLM settings
//! - [`error`]: HTTP error mapping
//! - [`gateway`]: The conversation gateway
//! - [`llm`]: Completion provider traits and implementations
//! - [`server`]: Router, handlers and server startup
//! - [`session`]: Conversation and session management

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod server;
pub mod session;

use gateway::Gateway;

/// Application state shared across all handlers.
///
/// Built once at startup and handed to the router; handlers reach the
/// session store only through the gateway.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Conversation gateway.
    pub gateway: Gateway,
}

impl AppState {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}
