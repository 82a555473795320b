//! Outbound half of the host boundary.

use crate::error::Result;
use crate::message::OutboundMessage;

/// Send primitive provided by the host shell.
///
/// `send` only enqueues the message for transmission; it must not wait for
/// the host to act on it. Replies and events arrive separately as
/// [`InboundMessage`](crate::message::InboundMessage)s.
///
/// Implementations return [`BridgeError::ChannelClosed`](crate::BridgeError::ChannelClosed)
/// once the host side has gone away.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::{HostChannel, OutboundMessage};
///
/// fn set_tooltip(channel: &dyn HostChannel, text: &str) -> bridge_traits::Result<()> {
///     channel.send(OutboundMessage::new(
///         "/nuvola/launcher/set-tooltip",
///         vec![text.into()],
///     ))
/// }
/// ```
pub trait HostChannel: Send + Sync {
    /// Enqueue a message for the host.
    fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Whether the channel can still accept messages.
    fn is_open(&self) -> bool {
        true
    }
}
