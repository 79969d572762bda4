//! Session and conversation thread management.
//!
//! This module provides in-memory session storage for managing conversation
//! state across multiple requests. Sessions are identified by an opaque
//! string key and hold a bounded, chronological message log.
//!
//! # Architecture
//!
//! - [`Session`]: A single conversation; [`Session::lock`] grants exclusive
//!   access to its log through a [`SessionGuard`]
//! - [`SessionStore`]: The storage interface the gateway depends on
//! - [`InMemorySessionStore`]: Thread-safe, evicting implementation
//!
//! # Example
//!
//! ```rust
//! use ask_gateway::llm::Message;
//! use ask_gateway::session::{InMemorySessionStore, SessionStore, TrimMode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemorySessionStore::default();
//! let session = store.checkout("demo");
//!
//! let mut log = session.lock().await;
//! log.append(Message::user("Hello!"));
//! log.trim(10, TrimMode::Pairwise);
//! assert_eq!(log.len(), 1);
//! # }
//! ```

mod store;
mod thread;

pub use store::{
    DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TIMEOUT, InMemorySessionStore, SessionStore,
    StoreLimits, spawn_sweeper,
};
pub use thread::{Session, SessionGuard, TrimMode};
