//! Outbound transport boundary.
//!
//! The broker connection itself (reconnects, QoS, subscriptions) lives in
//! the host process; the pipeline only needs somewhere to hand a finished
//! payload. `ChannelSink` is the in-process implementation used by hosts
//! that own the broker loop, and by tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// One message ready for the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Capability to publish on the message bus.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Sink that forwards outbound messages over an in-process channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { sender }
    }

    /// Builds a sink together with the receiving half.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.sender
            .send(OutboundMessage {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|_| anyhow::anyhow!("outbound channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_messages() {
        let (sink, mut receiver) = ChannelSink::pair();
        sink.publish("topic/a", b"payload".to_vec()).await.unwrap();
        let message = receiver.recv().await.unwrap();
        assert_eq!(message.topic, "topic/a");
        assert_eq!(message.payload, b"payload");
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (sink, receiver) = ChannelSink::pair();
        drop(receiver);
        assert!(sink.publish("topic/a", Vec::new()).await.is_err());
    }
}
