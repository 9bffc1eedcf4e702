//! Progress sink implementations.
//!
//! The runner pushes events; delivery is at-most-once with no backpressure.
//! `ChannelSink` feeds a tokio mpsc channel whose receiver forwards to the
//! real transport (e.g. a WebSocket write task); a dropped receiver means
//! the client went away, which is acceptable loss, not an error.

use async_trait::async_trait;
use tokio::sync::mpsc;

use noteworthy_core::models::ProgressEvent;

use crate::traits::ProgressSink;

/// Sink backed by an unbounded channel. Send failures (receiver dropped) are
/// ignored: the job keeps running to completion regardless of subscribers.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Progress subscriber gone, dropping event");
        }
    }
}

/// Discards all events. Used by the synchronous HTTP fallback, where the
/// caller only wants the final result.
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn send(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ProgressSink as _;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.send(ProgressEvent::thinking("a")).await;
        sink.send(ProgressEvent::processing("b", 5)).await;
        assert_eq!(rx.recv().await.unwrap().content.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.unwrap().content.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        // Must not panic or error.
        sink.send(ProgressEvent::thinking("a")).await;
    }
}
