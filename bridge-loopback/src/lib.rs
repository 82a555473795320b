//! # Loopback Host Bridge
//!
//! In-process implementation of the host boundary.
//!
//! ## Overview
//!
//! The real host shell receives page messages over its own IPC. This crate
//! replaces that transport with a pair of `tokio::sync::mpsc` queues and
//! ships [`MemoryHost`], a small simulated host that answers the storage,
//! launcher and notification operations from memory. It is used by the
//! workspace's end-to-end tests and by embedders that run the page API
//! without a host process.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_loopback::{pair, MemoryHost};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (channel, endpoint, inbound) = bridge_loopback::pair();
//!     let host = Arc::new(MemoryHost::new());
//!     tokio::spawn(host.clone().serve(endpoint));
//!
//!     // hand `channel` to the broker, pump `inbound` through `Broker::run`
//! }
//! ```

mod channel;
mod memory_host;

pub use channel::{pair, HostEndpoint, LoopbackChannel};
pub use memory_host::{MemoryHost, NotificationRecord, KEY_NOT_FOUND, UNKNOWN_OPERATION};
