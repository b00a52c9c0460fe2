//! Broad error classification.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    RateLimit,
    Quota,
    Transport,
    Timeout,
    Serialization,
    Cancelled,
    Authentication,
    InvalidRequest,
    Storage,
}
