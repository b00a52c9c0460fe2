//! Error types for chatrelay.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for relay and session operations.
#[derive(Error, Debug)]
pub enum ChatRelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Relay returned status {status}")]
    ConnectionFailed { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChatRelayError {
    /// Create an upstream error.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::QuotaExceeded { .. } => ErrorCategory::Quota,
            Self::Upstream { .. } | Self::ConnectionFailed { .. } => ErrorCategory::Transport,
            Self::Network(_) | Self::Io(_) => ErrorCategory::Transport,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Unauthorized(_) => ErrorCategory::Authentication,
            Self::InvalidArgument(_) | Self::InvalidState(_) => ErrorCategory::InvalidRequest,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Whether the user can reasonably retry the same request later.
    ///
    /// Nothing in this crate retries automatically; this only drives UI hints.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Transport | ErrorCategory::Timeout
        )
    }

    /// True for caller-initiated aborts, which are never reported as failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status the relay endpoint answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::QuotaExceeded { .. } => 402,
            Self::Unauthorized(_) => 401,
            Self::InvalidArgument(_) | Self::Serialization(_) => 400,
            _ => 500,
        }
    }

    /// Message placed in the relay's `{ "error": ... }` body.
    ///
    /// Rate-limit and quota messages pass through verbatim; everything else is
    /// collapsed so upstream details are not leaked to the browser.
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimited { message } | Self::QuotaExceeded { message } => message.clone(),
            Self::Configuration(msg) => msg.clone(),
            Self::Unauthorized(_) => "Unauthorized".to_string(),
            Self::InvalidArgument(msg) => msg.clone(),
            Self::Serialization(_) => "Malformed request body".to_string(),
            _ => "AI gateway error".to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChatRelayError>;
