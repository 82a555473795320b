//! Simulated host answering page operations from memory.

use crate::channel::HostEndpoint;
use bridge_traits::{InboundEvent, InboundMessage, InboundReply, OutboundMessage, Value};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Remote error code for reading a key that has neither a value nor a default.
pub const KEY_NOT_FOUND: &str = "key-not-found";
/// Remote error code for operations the host does not implement.
pub const UNKNOWN_OPERATION: &str = "unknown-operation";
const INVALID_ARGUMENTS: &str = "invalid-arguments";

const CONFIG_INDEX: u64 = 0;
const CONFIG_CHANGED: &str = "ConfigChanged";

/// Last state the page pushed for one named notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationRecord {
    pub title: String,
    pub text: String,
    pub icon_name: String,
    pub icon_path: String,
    pub resident: bool,
    pub category: String,
    pub actions: Vec<Value>,
    pub shown: usize,
    pub last_force: bool,
}

#[derive(Debug, Default)]
struct StorageSlot {
    values: HashMap<String, Value>,
    defaults: HashMap<String, Value>,
}

impl StorageSlot {
    fn effective(&self, key: &str) -> Option<&Value> {
        self.values.get(key).or_else(|| self.defaults.get(key))
    }
}

#[derive(Debug, Default)]
struct HostState {
    storage: HashMap<u64, StorageSlot>,
    tooltip: Option<String>,
    launcher_actions: Vec<String>,
    notifications: HashMap<String, NotificationRecord>,
    shown_notifications: Vec<Vec<Value>>,
    persistence_supported: bool,
    received: Vec<OutboundMessage>,
}

type Handled = Result<(Value, Option<InboundEvent>), (&'static str, String)>;

/// In-memory stand-in for the host shell.
///
/// [`handle`](Self::handle) is synchronous and returns the inbound messages a
/// real host would send back: a reply for correlated calls, plus any events
/// the call triggers (a changed config value emits `ConfigChanged`).
/// [`serve`](Self::serve) drives it from a [`HostEndpoint`].
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `is-persistence-supported` with `supported`.
    pub fn set_persistence_supported(&self, supported: bool) {
        self.lock().persistence_supported = supported;
    }

    pub fn tooltip(&self) -> Option<String> {
        self.lock().tooltip.clone()
    }

    pub fn launcher_actions(&self) -> Vec<String> {
        self.lock().launcher_actions.clone()
    }

    pub fn notification(&self, name: &str) -> Option<NotificationRecord> {
        self.lock().notifications.get(name).cloned()
    }

    /// Argument lists of every one-shot `show-notification` call.
    pub fn shown_notifications(&self) -> Vec<Vec<Value>> {
        self.lock().shown_notifications.clone()
    }

    /// Every message received so far, in arrival order.
    ///
    /// The log grows with every call until drained with
    /// [`take_received`](Self::take_received).
    pub fn received(&self) -> Vec<OutboundMessage> {
        self.lock().received.clone()
    }

    /// Drain the received-message log.
    pub fn take_received(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.lock().received)
    }

    /// Value stored for `key` in storage `index`, ignoring defaults.
    pub fn stored(&self, index: u64, key: &str) -> Option<Value> {
        self.lock()
            .storage
            .get(&index)
            .and_then(|slot| slot.values.get(key).cloned())
    }

    /// Build the event a host sends when a media key is pressed.
    pub fn media_key_event(key: &str) -> InboundMessage {
        InboundEvent::new("MediaKeyPressed", vec![json!(key)]).into()
    }

    /// Handle one page message and return what the host sends back.
    pub fn handle(&self, message: &OutboundMessage) -> Vec<InboundMessage> {
        let mut state = self.lock();
        state.received.push(message.clone());
        let outcome = Self::apply(&mut state, &message.operation, &message.arguments);
        drop(state);

        let mut out = Vec::new();
        let event = match outcome {
            Ok((value, event)) => {
                if let Some(id) = message.correlation_id {
                    out.push(InboundReply::success(id, value).into());
                }
                event
            }
            Err((code, text)) => {
                debug!(operation = %message.operation, code, "host rejected call");
                match message.correlation_id {
                    Some(id) => out.push(InboundReply::failure(id, code, text).into()),
                    None => warn!(operation = %message.operation, code, "void call failed on host"),
                }
                None
            }
        };
        if let Some(event) = event {
            out.push(event.into());
        }
        out
    }

    /// Serve the endpoint until the page drops its channel.
    pub async fn serve(self: Arc<Self>, mut endpoint: HostEndpoint) {
        while let Some(message) = endpoint.recv().await {
            for inbound in self.handle(&message) {
                if endpoint.deliver(inbound).is_err() {
                    debug!("page inbound queue closed; memory host stopping");
                    return;
                }
            }
        }
        debug!("page channel closed; memory host stopping");
    }

    fn apply(state: &mut HostState, operation: &str, args: &[Value]) -> Handled {
        match operation {
            "/nuvola/storage/set-default" => {
                let (index, key) = storage_target(args)?;
                let value = arg(args, 2)?.clone();
                state
                    .storage
                    .entry(index)
                    .or_default()
                    .defaults
                    .insert(key, value);
                Ok((Value::Null, None))
            }
            "/nuvola/storage/has-key" => {
                let (index, key) = storage_target(args)?;
                // Defaults do not count as stored values.
                let present = state
                    .storage
                    .get(&index)
                    .is_some_and(|slot| slot.values.contains_key(&key));
                Ok((json!(present), None))
            }
            "/nuvola/storage/get-value" => {
                let (index, key) = storage_target(args)?;
                state
                    .storage
                    .get(&index)
                    .and_then(|slot| slot.effective(&key).cloned())
                    .map(|value| (value, None))
                    .ok_or((KEY_NOT_FOUND, format!("no value for key '{key}'")))
            }
            "/nuvola/storage/set-value" => {
                let (index, key) = storage_target(args)?;
                let value = arg(args, 2)?.clone();
                let slot = state.storage.entry(index).or_default();
                let changed = slot.effective(&key) != Some(&value);
                slot.values.insert(key.clone(), value);
                let event = (changed && index == CONFIG_INDEX)
                    .then(|| InboundEvent::new(CONFIG_CHANGED, vec![json!(key)]));
                Ok((Value::Null, event))
            }
            "/nuvola/launcher/set-tooltip" => {
                state.tooltip = Some(string_arg(args, 0)?);
                Ok((Value::Null, None))
            }
            "/nuvola/launcher/set-actions" => {
                state.launcher_actions = string_list(arg(args, 0)?)?;
                Ok((Value::Null, None))
            }
            "/nuvola/launcher/remove-actions" => {
                state.launcher_actions.clear();
                Ok((Value::Null, None))
            }
            "/nuvola/launcher/add-action" => {
                state.launcher_actions.push(string_arg(args, 0)?);
                Ok((Value::Null, None))
            }
            "/nuvola/launcher/remove-action" => {
                let action = string_arg(args, 0)?;
                state.launcher_actions.retain(|a| *a != action);
                Ok((Value::Null, None))
            }
            "/nuvola/notification/update" => {
                let name = string_arg(args, 0)?;
                let record = state.notifications.entry(name).or_default();
                record.title = string_arg(args, 1)?;
                record.text = string_arg(args, 2)?;
                record.icon_name = string_arg(args, 3)?;
                record.icon_path = string_arg(args, 4)?;
                record.resident = arg(args, 5)?.as_bool().unwrap_or(false);
                record.category = string_arg(args, 6)?;
                Ok((Value::Null, None))
            }
            "/nuvola/notification/set-actions" => {
                let name = string_arg(args, 0)?;
                let actions = arg(args, 1)?.as_array().cloned().unwrap_or_default();
                state.notifications.entry(name).or_default().actions = actions;
                Ok((Value::Null, None))
            }
            "/nuvola/notification/remove-actions" => {
                let name = string_arg(args, 0)?;
                state.notifications.entry(name).or_default().actions.clear();
                Ok((Value::Null, None))
            }
            "/nuvola/notification/show" => {
                let name = string_arg(args, 0)?;
                let force = arg(args, 1)?.as_bool().unwrap_or(false);
                let record = state.notifications.entry(name).or_default();
                record.shown += 1;
                record.last_force = force;
                Ok((Value::Null, None))
            }
            "/nuvola/notifications/show-notification" => {
                state.shown_notifications.push(args.to_vec());
                Ok((Value::Null, None))
            }
            "/nuvola/notifications/is-persistence-supported" => {
                Ok((json!(state.persistence_supported), None))
            }
            other => Err((UNKNOWN_OPERATION, format!("host has no operation '{other}'"))),
        }
    }
}

fn arg(args: &[Value], position: usize) -> Result<&Value, (&'static str, String)> {
    args.get(position)
        .ok_or((INVALID_ARGUMENTS, format!("missing argument {position}")))
}

fn string_arg(args: &[Value], position: usize) -> Result<String, (&'static str, String)> {
    match arg(args, position)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn string_list(value: &Value) -> Result<Vec<String>, (&'static str, String)> {
    let items = value
        .as_array()
        .ok_or((INVALID_ARGUMENTS, "expected a list of actions".to_string()))?;
    Ok(items
        .iter()
        .map(|v| v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string()))
        .collect())
}

fn storage_target(args: &[Value]) -> Result<(u64, String), (&'static str, String)> {
    let index = arg(args, 0)?
        .as_u64()
        .ok_or((INVALID_ARGUMENTS, "storage index must be an integer".to_string()))?;
    let key = arg(args, 1)?
        .as_str()
        .ok_or((INVALID_ARGUMENTS, "storage key must be a string".to_string()))?
        .to_string();
    Ok((index, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::CorrelationId;

    fn call(id: u32, operation: &str, args: Vec<Value>) -> OutboundMessage {
        OutboundMessage::new(operation, args).with_correlation_id(CorrelationId(id))
    }

    fn reply_id(message: &InboundMessage) -> Option<CorrelationId> {
        match message {
            InboundMessage::Reply(reply) => Some(reply.correlation_id),
            InboundMessage::Event(_) => None,
        }
    }

    fn only_reply(messages: Vec<InboundMessage>) -> InboundReply {
        match messages.as_slice() {
            [InboundMessage::Reply(reply)] => reply.clone(),
            other => panic!("expected a single reply, got {other:?}"),
        }
    }

    #[test]
    fn test_default_only_key_is_readable_but_not_present() {
        let host = MemoryHost::new();
        host.handle(&call(1, "/nuvola/storage/set-default", vec![json!(1), json!("volume"), json!(50)]));

        let reply = only_reply(host.handle(&call(2, "/nuvola/storage/has-key", vec![json!(1), json!("volume")])));
        assert_eq!(reply.value, Some(json!(false)));

        let reply = only_reply(host.handle(&call(3, "/nuvola/storage/get-value", vec![json!(1), json!("volume")])));
        assert_eq!(reply.value, Some(json!(50)));
        assert_eq!(host.stored(1, "volume"), None);

        host.handle(&call(4, "/nuvola/storage/set-value", vec![json!(1), json!("volume"), json!(70)]));
        let reply = only_reply(host.handle(&call(5, "/nuvola/storage/has-key", vec![json!(1), json!("volume")])));
        assert_eq!(reply.value, Some(json!(true)));
    }

    #[test]
    fn test_missing_key_reports_key_not_found() {
        let host = MemoryHost::new();
        let reply = only_reply(host.handle(&call(1, "/nuvola/storage/get-value", vec![json!(0), json!("nope")])));

        assert!(!reply.ok);
        assert_eq!(reply.error_code.as_deref(), Some(KEY_NOT_FOUND));
    }

    #[test]
    fn test_config_change_emits_event_once() {
        let host = MemoryHost::new();
        let set = |id| call(id, "/nuvola/storage/set-value", vec![json!(0), json!("theme"), json!("dark")]);

        let first = host.handle(&set(1));
        assert_eq!(first.len(), 2);
        assert_eq!(
            first[1],
            InboundMessage::Event(InboundEvent::new("ConfigChanged", vec![json!("theme")]))
        );

        // Same value again: no change, no event.
        assert_eq!(host.handle(&set(2)).len(), 1);
    }

    #[test]
    fn test_session_change_emits_no_event() {
        let host = MemoryHost::new();
        let out = host.handle(&call(1, "/nuvola/storage/set-value", vec![json!(1), json!("k"), json!(true)]));
        assert_eq!(out.len(), 1);
        assert_eq!(reply_id(&out[0]), Some(CorrelationId(1)));
    }

    #[test]
    fn test_void_calls_get_no_reply() {
        let host = MemoryHost::new();
        let out = host.handle(&OutboundMessage::new("/nuvola/launcher/add-action", vec![json!("quit")]));
        assert!(out.is_empty());
        assert_eq!(host.launcher_actions(), vec!["quit".to_string()]);

        host.handle(&OutboundMessage::new("/nuvola/launcher/remove-action", vec![json!("quit")]));
        assert!(host.launcher_actions().is_empty());
    }

    #[test]
    fn test_unknown_operation_is_remote_failure() {
        let host = MemoryHost::new();
        let reply = only_reply(host.handle(&call(5, "/nuvola/bogus", vec![])));
        assert_eq!(reply.error_code.as_deref(), Some(UNKNOWN_OPERATION));
        assert_eq!(host.received().len(), 1);
    }

    #[test]
    fn test_take_received_drains_log() {
        let host = MemoryHost::new();
        host.handle(&OutboundMessage::new("/nuvola/launcher/set-tooltip", vec![json!("a")]));
        host.handle(&OutboundMessage::new("/nuvola/launcher/set-tooltip", vec![json!("b")]));

        let drained = host.take_received();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].arguments, vec![json!("b")]);
        assert!(host.received().is_empty());
        assert_eq!(host.tooltip().as_deref(), Some("b"));
    }

    #[test]
    fn test_notification_lifecycle() {
        let host = MemoryHost::new();
        host.handle(&OutboundMessage::new(
            "/nuvola/notification/update",
            vec![
                json!("track"),
                json!("Song"),
                json!("Artist"),
                json!("audio-x-generic"),
                json!(""),
                json!(true),
                json!("x-nuvola.track"),
            ],
        ));
        host.handle(&OutboundMessage::new("/nuvola/notification/show", vec![json!("track"), json!(true)]));

        let record = host.notification("track").unwrap();
        assert_eq!(record.title, "Song");
        assert!(record.resident);
        assert_eq!(record.shown, 1);
        assert!(record.last_force);
    }
}
