//! Queue-backed host channel.

use bridge_traits::{
    error::{BridgeError, Result},
    HostChannel, InboundMessage, OutboundMessage,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Page side of the loopback: implements [`HostChannel`] by pushing onto an
/// unbounded queue read by the [`HostEndpoint`].
#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    outbound: UnboundedSender<OutboundMessage>,
}

impl HostChannel for LoopbackChannel {
    fn send(&self, message: OutboundMessage) -> Result<()> {
        trace!(operation = %message.operation, correlation_id = ?message.correlation_id, "loopback send");
        self.outbound
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed("loopback host endpoint dropped".to_string()))
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// Host side of the loopback.
///
/// Receives what the page sends and delivers replies and events back to it.
#[derive(Debug)]
pub struct HostEndpoint {
    outbound: UnboundedReceiver<OutboundMessage>,
    inbound: UnboundedSender<InboundMessage>,
}

impl HostEndpoint {
    /// Next message from the page, or `None` once every [`LoopbackChannel`]
    /// clone has been dropped.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.recv().await
    }

    /// Non-waiting variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.try_recv().ok()
    }

    /// Deliver a reply or event to the page.
    pub fn deliver(&self, message: impl Into<InboundMessage>) -> Result<()> {
        self.inbound
            .send(message.into())
            .map_err(|_| BridgeError::ChannelClosed("page inbound queue dropped".to_string()))
    }

    /// Extra handle for injecting host events from outside the serve loop.
    pub fn inbound_sender(&self) -> UnboundedSender<InboundMessage> {
        self.inbound.clone()
    }

    /// Drop the host side of both queues. The page's inbound stream ends and
    /// further sends fail with `ChannelClosed`.
    pub fn close(self) {
        drop(self);
    }
}

/// Create a connected loopback.
///
/// Returns the page's send channel, the host endpoint and the page's inbound
/// stream (to be pumped by the broker).
pub fn pair() -> (LoopbackChannel, HostEndpoint, UnboundedReceiver<InboundMessage>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        LoopbackChannel { outbound: out_tx },
        HostEndpoint {
            outbound: out_rx,
            inbound: in_tx,
        },
        in_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{CorrelationId, InboundReply};
    use serde_json::json;

    #[tokio::test]
    async fn test_messages_cross_both_ways() {
        let (channel, mut endpoint, mut inbound) = pair();

        channel
            .send(
                OutboundMessage::new("/nuvola/storage/has-key", vec![json!(0), json!("k")])
                    .with_correlation_id(CorrelationId(1)),
            )
            .unwrap();
        let received = endpoint.recv().await.unwrap();
        assert_eq!(received.operation, "/nuvola/storage/has-key");

        endpoint
            .deliver(InboundReply::success(CorrelationId(1), json!(false)))
            .unwrap();
        match inbound.recv().await.unwrap() {
            InboundMessage::Reply(reply) => assert_eq!(reply.correlation_id, CorrelationId(1)),
            other => panic!("unexpected inbound message: {other:?}"),
        }
    }

    #[test]
    fn test_send_after_close_fails() {
        let (channel, endpoint, _inbound) = pair();
        assert!(channel.is_open());

        endpoint.close();

        assert!(!channel.is_open());
        let err = channel
            .send(OutboundMessage::new("/nuvola/launcher/remove-actions", vec![]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ChannelClosed(_)));
    }

    #[tokio::test]
    async fn test_inbound_stream_ends_when_host_closes() {
        let (_channel, endpoint, mut inbound) = pair();
        endpoint.close();
        assert!(inbound.recv().await.is_none());
    }
}
