//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::error::ChatRelayError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ChatRelayError>>,
) -> Result<T, ChatRelayError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ChatRelayError::Timeout(duration.as_millis() as u64)),
    }
}

/// Await the next stream item, failing if none arrives within `idle`.
pub async fn next_within<S>(idle: Duration, stream: &mut S) -> Result<Option<S::Item>, ChatRelayError>
where
    S: Stream + Unpin,
{
    with_timeout(idle, async { Ok(stream.next().await) }).await
}
