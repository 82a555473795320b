//! Wire-level message contract between the page and the host.
//!
//! These types describe *what* crosses the boundary, not *how*: the host is
//! free to carry them over any transport. Field names serialize in camelCase
//! to match the host's message schema.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use serde_json::Value;

/// Integer tag that pairs one outbound request with its inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u32);

impl CorrelationId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for CorrelationId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A named call sent to the host.
///
/// `correlation_id` is present only for calls that expect a reply (blocking
/// and deferred shapes). Fire-and-forget calls leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl OutboundMessage {
    pub fn new(operation: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Whether the sender is waiting for a reply to this message.
    pub fn expects_reply(&self) -> bool {
        self.correlation_id.is_some()
    }
}

/// The host's answer to a correlated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReply {
    pub correlation_id: CorrelationId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InboundReply {
    /// Successful reply carrying `value`.
    pub fn success(correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            correlation_id,
            ok: true,
            value: Some(value),
            error_code: None,
            error_message: None,
        }
    }

    /// Failed reply: the host ran the operation and reported an error.
    pub fn failure(
        correlation_id: CorrelationId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            ok: false,
            value: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// An unsolicited notification from the host, addressed by signal name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub signal: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl InboundEvent {
    pub fn new(signal: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            signal: signal.into(),
            arguments,
        }
    }
}

/// Anything the host can deliver to the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Reply(InboundReply),
    Event(InboundEvent),
}

impl From<InboundReply> for InboundMessage {
    fn from(reply: InboundReply) -> Self {
        InboundMessage::Reply(reply)
    }
}

impl From<InboundEvent> for InboundMessage {
    fn from(event: InboundEvent) -> Self {
        InboundMessage::Event(event)
    }
}
