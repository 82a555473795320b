//! # Core Runtime
//!
//! The mechanisms every page API wrapper is built from:
//! - [`object`] - prototypes, mixins and instances with a flattened operation table
//! - [`signals`] - the signal mixin: named, ordered, synchronous subscriptions
//! - [`broker`] - the async call broker correlating host replies with callers
//! - [`config`] - broker configuration
//! - [`logging`] - `tracing` bootstrap and host log forwarding
//!
//! ## Overview
//!
//! Wrappers declare named remote operations on a [`Prototype`](object::Prototype).
//! Each operation packages its arguments and hands them to the
//! [`Broker`](broker::Broker), which sends them over the host channel and
//! resolves the caller's handle when the matching reply arrives. Host events
//! come back through the same broker and are re-emitted on the signal tables
//! of the instances registered for them.
//!
//! Errors come in two kinds. [`Error`] variants other than `Fault` are
//! programmer errors and surface immediately. [`Fault`] values are data: they
//! reject a single call and leave everything else running.

pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod object;
pub mod runtime;
pub mod signals;

pub use broker::{Broker, CallContext, CallState, Deferred};
pub use config::BrokerConfig;
pub use error::{Error, Fault, Result};
pub use object::{Instance, Mixin, Outcome, Prototype};
pub use signals::{Signals, Subscription};
