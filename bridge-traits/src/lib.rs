//! # Host Bridge Traits
//!
//! The contract between the in-page API and the host media-player shell.
//!
//! ## Overview
//!
//! Integration scripts never talk to the host process directly. Every remote
//! operation is encoded as a named message with an argument list and handed to
//! a host-provided send primitive; replies and unsolicited host events flow
//! back as inbound messages. This crate defines that narrow boundary so the
//! core runtime stays independent of the byte-level transport.
//!
//! ## Contents
//!
//! - [`message`] - Outbound calls, inbound replies and inbound events
//! - [`HostChannel`](channel::HostChannel) - Send primitive provided by the host
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to the host
//! - [`BridgeError`](error::BridgeError) - Transport-level failures
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync` so one channel can be shared by every
//! wrapper object and by the broker's inbound pump.

pub mod channel;
pub mod error;
pub mod logging;
pub mod message;

pub use error::{BridgeError, Result};

pub use channel::HostChannel;
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use message::{
    CorrelationId, InboundEvent, InboundMessage, InboundReply, OutboundMessage, Value,
};
