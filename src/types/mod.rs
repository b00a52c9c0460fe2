//! Core types for chatrelay.

pub mod message;
pub mod stream;

pub use message::*;
pub use stream::*;
