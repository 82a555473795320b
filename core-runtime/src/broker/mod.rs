//! # Async Call Broker
//!
//! Multiplexes request/reply exchanges with the host over one
//! [`HostChannel`], matching replies to callers by correlation id.
//!
//! ## Call shapes
//!
//! | Shape | Method | Result surfaced as |
//! |-------|--------|--------------------|
//! | void | [`Broker::call_void`] | nothing beyond "enqueued" |
//! | blocking | [`Broker::call_blocking`] | the reply value, or an error |
//! | deferred | [`Broker::begin`] / [`Broker::call`] | an awaitable [`Deferred`] |
//!
//! ## Lifecycle
//!
//! ```text
//!  begin ──► register id ──► setup(ctx) ──► send ──► Deferred (pending)
//!                                 │                        │
//!                                 └─ Err: settle rejected   │
//!                                                           ▼
//!  dispatch(Reply{id}) ──► take id ──► settle ──► Deferred resolves
//!  shutdown ──► drain table ──► settle all with Fault::Transport
//! ```
//!
//! Replies may arrive in any order; the pending table is a map from id to
//! record, not a queue. A reply for an unknown id is logged and dropped.
//!
//! Inbound events are routed by signal name to instances registered with
//! [`Broker::route_signal`] and emitted on their signal tables.

mod deferred;
mod pending;

pub use deferred::{CallState, Deferred};

use crate::config::BrokerConfig;
use crate::error::{Error, Fault, Result};
use crate::object::Instance;
use crate::runtime;
use bridge_traits::{
    CorrelationId, HostChannel, InboundEvent, InboundMessage, InboundReply, OutboundMessage, Value,
};
use pending::{PendingTable, Settlement};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

thread_local! {
    /// Depth of reply dispatch and blocking waits on this thread.
    static RESOLVING: Cell<usize> = const { Cell::new(0) };
}

struct ResolutionGuard;

impl ResolutionGuard {
    fn enter() -> Self {
        RESOLVING.with(|depth| depth.set(depth.get() + 1));
        ResolutionGuard
    }

    fn active() -> bool {
        RESOLVING.with(|depth| depth.get() > 0)
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Passed to the setup closure of [`Broker::begin`].
#[derive(Debug, Clone)]
pub struct CallContext {
    pub id: CorrelationId,
    pub operation: String,
}

pub struct Broker {
    config: BrokerConfig,
    channel: Arc<dyn HostChannel>,
    pending: Mutex<PendingTable>,
    routes: Mutex<HashMap<String, Vec<Weak<Instance>>>>,
}

impl Broker {
    pub fn new(config: BrokerConfig, channel: Arc<dyn HostChannel>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            pending: Mutex::new(PendingTable::new(config.correlation_limit)),
            routes: Mutex::new(HashMap::new()),
            config,
            channel,
        }))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_routes(&self) -> MutexGuard<'_, HashMap<String, Vec<Weak<Instance>>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_pending().is_closed()
    }

    // ------------------------------------------------------------------------
    // Call shapes
    // ------------------------------------------------------------------------

    /// Fire-and-forget.
    pub fn call_void(&self, operation: &str, arguments: Vec<Value>) -> std::result::Result<(), Fault> {
        if self.is_shut_down() {
            return Err(Fault::Transport(format!(
                "broker is shut down; {operation} not sent"
            )));
        }
        trace!(operation, "void call");
        self.channel
            .send(OutboundMessage::new(operation, arguments))
            .map_err(Fault::from)
    }

    /// Deferred call with a setup step.
    ///
    /// An id is allocated and a pending record registered before `setup`
    /// runs. `setup` produces the argument list (and may validate it); if it
    /// fails, the handle is settled as rejected and nothing is sent. A send
    /// failure rejects the handle with [`Fault::Transport`].
    ///
    /// `setup` must not panic: report problems by returning `Err`. A panic
    /// unwinds past the registered id, which then stays pending until
    /// [`shutdown`](Self::shutdown).
    pub fn begin<F>(&self, operation: &str, setup: F) -> Deferred
    where
        F: FnOnce(&CallContext) -> std::result::Result<Vec<Value>, Fault>,
    {
        let registered = self.lock_pending().register(operation);
        let (id, receiver) = match registered {
            Ok(slot) => slot,
            Err(fault) => return Deferred::rejected(operation, fault),
        };
        let handle = Deferred::waiting(id, operation, receiver);

        let ctx = CallContext {
            id,
            operation: operation.to_string(),
        };
        let arguments = match setup(&ctx) {
            Ok(arguments) => arguments,
            Err(fault) => {
                debug!(correlation_id = %id, operation, %fault, "call setup failed; nothing sent");
                self.settle(id, Err(fault));
                return handle;
            }
        };

        let message = OutboundMessage::new(operation, arguments).with_correlation_id(id);
        if let Err(err) = self.channel.send(message) {
            warn!(correlation_id = %id, operation, error = %err, "send failed");
            self.settle(id, Err(err.into()));
            return handle;
        }

        debug!(correlation_id = %id, operation, "deferred call sent");
        handle
    }

    /// Deferred call with a ready-made argument list.
    pub fn call(&self, operation: &str, arguments: Vec<Value>) -> Deferred {
        self.begin(operation, move |_| Ok(arguments))
    }

    /// Send and wait on the calling thread for the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::ReentrantBlockingCall`] while this thread is dispatching a
    ///   reply or already inside a blocking wait
    /// - [`Error::BlockingInAsyncContext`] inside a Tokio runtime
    /// - [`Error::Fault`] for transport, remote or timeout failures
    pub fn call_blocking(&self, operation: &str, arguments: Vec<Value>) -> Result<Value> {
        if ResolutionGuard::active() {
            return Err(Error::ReentrantBlockingCall {
                operation: operation.to_string(),
            });
        }
        if runtime::in_async_context() {
            return Err(Error::BlockingInAsyncContext {
                operation: operation.to_string(),
            });
        }

        let _guard = ResolutionGuard::enter();
        let handle = self.call(operation, arguments);
        let id = handle.id();
        let timeout = self.config.blocking_timeout;

        let waited = runtime::block_on(async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, handle).await.ok(),
                None => Some(handle.await),
            }
        })
        .map_err(|e| Fault::Transport(format!("cannot wait for {operation}: {e}")))?;

        match waited {
            Some(result) => Ok(result?),
            None => {
                if let Some(id) = id {
                    self.lock_pending().take(id);
                }
                warn!(correlation_id = ?id, operation, ?timeout, "blocking call timed out");
                Err(Fault::Transport(format!("no reply to {operation} within {timeout:?}")).into())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inbound side
    // ------------------------------------------------------------------------

    fn settle(&self, id: CorrelationId, result: Settlement) -> bool {
        let Some(call) = self.lock_pending().take(id) else {
            return false;
        };
        let operation = call.operation.clone();
        if !call.settle(result) {
            debug!(correlation_id = %id, operation = %operation, "caller dropped its handle");
        }
        true
    }

    /// Handle one inbound message.
    ///
    /// A reply for an unknown or expired id is logged and returned as
    /// [`Fault::Protocol`]; the broker keeps running.
    pub fn dispatch(&self, message: InboundMessage) -> std::result::Result<(), Fault> {
        let _guard = ResolutionGuard::enter();
        match message {
            InboundMessage::Reply(reply) => self.dispatch_reply(reply),
            InboundMessage::Event(event) => {
                self.dispatch_event(event);
                Ok(())
            }
        }
    }

    fn dispatch_reply(&self, reply: InboundReply) -> std::result::Result<(), Fault> {
        let id = reply.correlation_id;
        let result = if reply.ok {
            Ok(reply.value.unwrap_or(Value::Null))
        } else {
            Err(Fault::Remote {
                code: reply.error_code.unwrap_or_else(|| "unknown".to_string()),
                message: reply.error_message.unwrap_or_default(),
            })
        };

        if self.settle(id, result) {
            debug!(correlation_id = %id, ok = reply.ok, "reply settled");
            Ok(())
        } else {
            warn!(correlation_id = %id, "reply for unknown or expired correlation id dropped");
            Err(Fault::Protocol(format!("no pending call for correlation id {id}")))
        }
    }

    fn dispatch_event(&self, event: InboundEvent) {
        let targets: Vec<Arc<Instance>> = {
            let mut routes = self.lock_routes();
            match routes.get_mut(&event.signal) {
                Some(list) => {
                    list.retain(|weak| weak.strong_count() > 0);
                    list.iter().filter_map(Weak::upgrade).collect()
                }
                None => Vec::new(),
            }
        };

        if targets.is_empty() {
            debug!(signal = %event.signal, "host event has no route; dropped");
            return;
        }

        for target in targets {
            let delivered = target
                .signals()
                .and_then(|signals| signals.emit(&event.signal, &event.arguments));
            match delivered {
                Ok(count) => trace!(signal = %event.signal, subscribers = count, "host event emitted"),
                Err(err) => warn!(signal = %event.signal, error = %err, "host event emission failed"),
            }
        }
    }

    /// Deliver host events named `signal` to `instance`.
    ///
    /// The broker holds a weak reference; dropped instances stop receiving
    /// events without unregistering.
    ///
    /// # Errors
    ///
    /// [`Error::CapabilityMissing`] without signal support, or
    /// [`Error::UndeclaredSignal`] if the instance never declared `signal`.
    pub fn route_signal(&self, signal: &str, instance: &Arc<Instance>) -> Result<()> {
        let signals = instance.signals()?;
        if !signals.is_declared(signal) {
            return Err(Error::UndeclaredSignal {
                owner: instance.prototype_name().to_string(),
                signal: signal.to_string(),
            });
        }
        self.lock_routes()
            .entry(signal.to_string())
            .or_default()
            .push(Arc::downgrade(instance));
        Ok(())
    }

    /// Tear down: refuse new calls and reject everything still pending with
    /// [`Fault::Transport`]. Returns the number of calls settled.
    pub fn shutdown(&self) -> usize {
        let drained = self.lock_pending().close();
        let count = drained.len();
        for (id, call) in drained {
            trace!(correlation_id = %id, operation = %call.operation, "rejecting on teardown");
            let fault = Fault::Transport(format!(
                "broker shut down before {} received a reply",
                call.operation
            ));
            call.settle(Err(fault));
        }
        info!(settled = count, "broker shut down");
        count
    }

    /// Pump inbound messages until the stream ends or `cancel` fires, then
    /// shut down.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: UnboundedReceiver<InboundMessage>,
        cancel: CancellationToken,
    ) {
        debug!("broker pump started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("broker pump cancelled");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        if let Err(fault) = self.dispatch(message) {
                            trace!(%fault, "inbound message discarded");
                        }
                    }
                    None => {
                        debug!("host inbound stream closed");
                        break;
                    }
                },
            }
        }
        self.shutdown();
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Prototype;
    use crate::signals;
    use bridge_traits::BridgeError;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: StdMutex<Vec<OutboundMessage>>,
    }

    impl HostChannel for RecordingChannel {
        fn send(&self, message: OutboundMessage) -> bridge_traits::Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct ClosedChannel;

    impl HostChannel for ClosedChannel {
        fn send(&self, _message: OutboundMessage) -> bridge_traits::Result<()> {
            Err(BridgeError::ChannelClosed("host gone".into()))
        }
    }

    fn broker_with(channel: Arc<dyn HostChannel>) -> Arc<Broker> {
        Broker::new(BrokerConfig::default(), channel).unwrap()
    }

    #[tokio::test]
    async fn test_reply_settles_matching_call() {
        let channel = Arc::new(RecordingChannel::default());
        let broker = broker_with(channel.clone());

        let handle = broker.call("/nuvola/storage/has-key", vec![json!(0), json!("k")]);
        let id = handle.id().unwrap();
        assert_eq!(id, CorrelationId(1));
        assert_eq!(channel.sent.lock().unwrap()[0].correlation_id, Some(id));

        broker
            .dispatch(InboundReply::success(id, json!(true)).into())
            .unwrap();
        assert_eq!(handle.await, Ok(json!(true)));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_carries_code_and_message() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let handle = broker.call("/nuvola/storage/get-value", vec![]);
        let id = handle.id().unwrap();

        broker
            .dispatch(InboundReply::failure(id, "key-not-found", "no such key").into())
            .unwrap();
        assert_eq!(
            handle.await,
            Err(Fault::Remote {
                code: "key-not-found".into(),
                message: "no such key".into()
            })
        );
    }

    #[test]
    fn test_unknown_reply_is_protocol_fault() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let result = broker.dispatch(InboundReply::success(CorrelationId(99), json!(1)).into());
        assert!(matches!(result, Err(Fault::Protocol(_))));
    }

    #[test]
    fn test_duplicate_reply_settles_once() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let mut handle = broker.call("/op", vec![]);
        let id = handle.id().unwrap();

        broker.dispatch(InboundReply::success(id, json!("first")).into()).unwrap();
        assert!(broker.dispatch(InboundReply::success(id, json!("second")).into()).is_err());
        assert_eq!(handle.try_state(), CallState::Fulfilled(json!("first")));
    }

    #[test]
    fn test_setup_failure_rejects_without_sending() {
        let channel = Arc::new(RecordingChannel::default());
        let broker = broker_with(channel.clone());

        let mut handle = broker.begin("/nuvola/storage/set-value", |ctx| {
            assert_eq!(ctx.operation, "/nuvola/storage/set-value");
            Err(Fault::LocalValidation("objects are not storable".into()))
        });

        assert!(matches!(handle.try_state(), CallState::Rejected(Fault::LocalValidation(_))));
        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn test_panicking_setup_stays_pending_until_shutdown() {
        let channel = Arc::new(RecordingChannel::default());
        let broker = broker_with(channel.clone());

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            broker.begin("/nuvola/storage/get-value", |_| panic!("bad setup"))
        }));

        assert!(unwound.is_err());
        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(broker.pending_count(), 1);
        assert_eq!(broker.shutdown(), 1);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn test_send_failure_rejects_with_transport() {
        let broker = broker_with(Arc::new(ClosedChannel));
        let mut handle = broker.call("/op", vec![]);
        assert!(matches!(handle.try_state(), CallState::Rejected(Fault::Transport(_))));
        assert_eq!(broker.pending_count(), 0);

        assert!(matches!(broker.call_void("/op", vec![]), Err(Fault::Transport(_))));
    }

    #[test]
    fn test_shutdown_rejects_pending_and_future_calls() {
        let channel = Arc::new(RecordingChannel::default());
        let broker = broker_with(channel.clone());
        let mut a = broker.call("/a", vec![]);
        let mut b = broker.call("/b", vec![]);

        assert_eq!(broker.shutdown(), 2);
        assert!(matches!(a.try_state(), CallState::Rejected(Fault::Transport(_))));
        assert!(matches!(b.try_state(), CallState::Rejected(Fault::Transport(_))));

        let mut late = broker.call("/late", vec![]);
        assert!(matches!(late.try_state(), CallState::Rejected(Fault::Transport(_))));
        assert!(broker.call_void("/late", vec![]).is_err());
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blocking_call_inside_runtime_is_refused() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let err = broker.call_blocking("/op", vec![]).unwrap_err();
        assert!(matches!(err, Error::BlockingInAsyncContext { .. }));
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn test_blocking_call_from_dispatch_is_reentrant() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let proto = Prototype::builder("Listener")
            .mixin(signals::mixin())
            .signal("Poke")
            .build()
            .unwrap();
        let listener = Instance::new(&proto, &[]).unwrap();
        broker.route_signal("Poke", &listener).unwrap();

        let outcome = Arc::new(StdMutex::new(None));
        {
            let broker = Arc::clone(&broker);
            let outcome = Arc::clone(&outcome);
            listener
                .signals()
                .unwrap()
                .connect("Poke", move |_| {
                    *outcome.lock().unwrap() = Some(broker.call_blocking("/op", vec![]));
                })
                .unwrap();
        }

        broker
            .dispatch(InboundEvent::new("Poke", vec![]).into())
            .unwrap();
        let result = outcome.lock().unwrap().take().unwrap();
        assert!(matches!(result, Err(Error::ReentrantBlockingCall { .. })));
    }

    #[test]
    fn test_blocking_timeout_removes_pending_entry() {
        let config = BrokerConfig::builder()
            .blocking_timeout(std::time::Duration::from_millis(20))
            .build()
            .unwrap();
        let broker = Broker::new(config, Arc::new(RecordingChannel::default())).unwrap();

        let err = broker.call_blocking("/slow", vec![]).unwrap_err();
        assert!(matches!(err.as_fault(), Some(Fault::Transport(msg)) if msg.contains("/slow")));
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn test_event_routing_skips_dropped_instances() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let proto = Prototype::builder("Keys")
            .mixin(signals::mixin())
            .signal("MediaKeyPressed")
            .build()
            .unwrap();

        let kept = Instance::new(&proto, &[]).unwrap();
        let dropped = Instance::new(&proto, &[]).unwrap();
        broker.route_signal("MediaKeyPressed", &kept).unwrap();
        broker.route_signal("MediaKeyPressed", &dropped).unwrap();
        drop(dropped);

        let hits = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        kept.signals()
            .unwrap()
            .connect("MediaKeyPressed", move |args| sink.lock().unwrap().push(args[0].clone()))
            .unwrap();

        broker
            .dispatch(InboundEvent::new("MediaKeyPressed", vec![json!("Play")]).into())
            .unwrap();
        broker
            .dispatch(InboundEvent::new("Unrouted", vec![]).into())
            .unwrap();

        assert_eq!(*hits.lock().unwrap(), vec![json!("Play")]);
        assert_eq!(broker.lock_routes()["MediaKeyPressed"].len(), 1);
    }

    #[test]
    fn test_route_requires_declared_signal() {
        let broker = broker_with(Arc::new(RecordingChannel::default()));
        let plain = Instance::new(&Prototype::builder("Plain").build().unwrap(), &[]).unwrap();
        assert!(matches!(
            broker.route_signal("X", &plain),
            Err(Error::CapabilityMissing { .. })
        ));

        let proto = Prototype::builder("Emitter").mixin(signals::mixin()).build().unwrap();
        let emitter = Instance::new(&proto, &[]).unwrap();
        assert!(matches!(
            broker.route_signal("X", &emitter),
            Err(Error::UndeclaredSignal { .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BrokerConfig {
            correlation_limit: 0,
            blocking_timeout: None,
        };
        assert!(matches!(
            Broker::new(config, Arc::new(RecordingChannel::default())),
            Err(Error::Config(_))
        ));
    }
}
