//! chatrelay: streaming chat relay for an AI chat widget.
//!
//! Two halves of one chat turn:
//!
//! - [`relay::RelayService`] holds the upstream credential, prepends the
//!   system instruction and streams the provider's SSE body back unchanged,
//!   translating only failure statuses. [`relay::server`] exposes it over HTTP.
//! - [`session::ChatSession`] sends a bounded window of the conversation,
//!   decodes the streamed frames incrementally ([`sse`]) and grows the
//!   assistant message, with cancellation and an idle timeout.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatrelay::prelude::*;
//!
//! # async fn example() -> chatrelay::error::Result<()> {
//! let transport = Arc::new(HttpTransport::new("http://127.0.0.1:8787/chat", None)?);
//! let session = ChatSession::new(transport, ChatConfig::default())?;
//! if let TurnOutcome::Completed { text, .. } = session.send_turn("Hello!").await {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod prelude;
pub mod relay;
pub mod session;
pub mod sse;
pub mod storage;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
