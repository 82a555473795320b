//! Desktop notifications.
//!
//! A [`Notification`] is a named, updatable bubble the host keeps track of;
//! the page pushes its content and actions and asks the host to show it.
//! [`Notifications`] creates named notifications and shows one-off ones.

use crate::error::Result;
use crate::operations::{
    text_or_empty, truthy, NOTIFICATIONS_IS_PERSISTENCE_SUPPORTED, NOTIFICATIONS_SHOW,
    NOTIFICATION_REMOVE_ACTIONS, NOTIFICATION_SET_ACTIONS, NOTIFICATION_SHOW, NOTIFICATION_UPDATE,
};
use core_runtime::{Broker, Error, Instance, Outcome, Prototype};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub const NOTIFICATION_PROTOTYPE: &str = "Notification";
pub const NOTIFICATIONS_PROTOTYPE: &str = "Notifications";

fn name_of(this: &Instance) -> core_runtime::Result<Value> {
    this.field("name").ok_or_else(|| {
        Error::Config(format!("{} instance has no name", this.prototype_name()))
    })
}

fn arg(args: &[Value], position: usize) -> Value {
    args.get(position).cloned().unwrap_or(Value::Null)
}

/// Prototype of named notifications. Instances are created with
/// `[name, resident, category]`.
pub fn notification_prototype(broker: &Arc<Broker>) -> core_runtime::Result<Arc<Prototype>> {
    let update = Arc::clone(broker);
    let set_actions = Arc::clone(broker);
    let remove_actions = Arc::clone(broker);
    let show = Arc::clone(broker);

    Prototype::builder(NOTIFICATION_PROTOTYPE)
        .initializer(|this, args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Config("a notification needs a name".to_string()))?;
            this.set_field("name", json!(name));
            this.set_field("resident", json!(truthy(args.get(1))));
            this.set_field("category", text_or_empty(args, 2));
            Ok(())
        })
        // [title, text, icon_name, icon_path, resident]; a null resident
        // keeps the stored flag.
        .operation("update", move |this, args| {
            let resident = match args.get(4) {
                None | Some(Value::Null) => this.field("resident").unwrap_or(json!(false)),
                Some(given) => {
                    let resident = json!(truthy(Some(given)));
                    this.set_field("resident", resident.clone());
                    resident
                }
            };
            let category = this.field("category").unwrap_or(json!(""));
            update.call_void(
                NOTIFICATION_UPDATE,
                vec![
                    name_of(this)?,
                    arg(args, 0),
                    arg(args, 1),
                    text_or_empty(args, 2),
                    text_or_empty(args, 3),
                    resident,
                    category,
                ],
            )?;
            Ok(Outcome::unit())
        })
        .operation("set_actions", move |this, args| {
            set_actions.call_void(NOTIFICATION_SET_ACTIONS, vec![name_of(this)?, arg(args, 0)])?;
            Ok(Outcome::unit())
        })
        .operation("remove_actions", move |this, _| {
            remove_actions.call_void(NOTIFICATION_REMOVE_ACTIONS, vec![name_of(this)?])?;
            Ok(Outcome::unit())
        })
        .operation("show", move |this, args| {
            show.call_void(NOTIFICATION_SHOW, vec![name_of(this)?, json!(truthy(args.first()))])?;
            Ok(Outcome::unit())
        })
        .build()
}

pub fn notifications_prototype(broker: &Arc<Broker>) -> core_runtime::Result<Arc<Prototype>> {
    let blocking = Arc::clone(broker);
    let deferred = Arc::clone(broker);
    let show = Arc::clone(broker);

    Prototype::builder(NOTIFICATIONS_PROTOTYPE)
        .operation("is_persistence_supported", move |_, _| {
            warn!(
                "Notifications.is_persistence_supported is deprecated since Nuvola 4.8. Use async variant instead."
            );
            let supported = blocking.call_blocking(NOTIFICATIONS_IS_PERSISTENCE_SUPPORTED, Vec::new())?;
            Ok(Outcome::Value(supported))
        })
        .operation("is_persistence_supported_async", move |_, _| {
            Ok(deferred
                .call(NOTIFICATIONS_IS_PERSISTENCE_SUPPORTED, Vec::new())
                .into())
        })
        // [title, text, icon_name, icon_path, force, category]
        .operation("show_notification", move |_, args| {
            show.call_void(
                NOTIFICATIONS_SHOW,
                vec![
                    arg(args, 0),
                    text_or_empty(args, 1),
                    text_or_empty(args, 2),
                    text_or_empty(args, 3),
                    json!(truthy(args.get(4))),
                    text_or_empty(args, 5),
                ],
            )?;
            Ok(Outcome::unit())
        })
        .build()
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| json!(s))
}

/// A named notification.
#[derive(Debug, Clone)]
pub struct Notification {
    instance: Arc<Instance>,
}

impl Notification {
    pub fn new(
        prototype: &Arc<Prototype>,
        name: &str,
        resident: bool,
        category: Option<&str>,
    ) -> Result<Self> {
        let instance = Instance::new(prototype, &[json!(name), json!(resident), opt(category)])?;
        Ok(Self { instance })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn name(&self) -> String {
        self.instance
            .field("name")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    pub fn is_resident(&self) -> bool {
        truthy(self.instance.field("resident").as_ref())
    }

    /// Push new content. `resident: None` keeps the previous residency.
    pub fn update(
        &self,
        title: &str,
        text: &str,
        icon_name: Option<&str>,
        icon_path: Option<&str>,
        resident: Option<bool>,
    ) -> Result<()> {
        let resident = resident.map_or(Value::Null, Value::Bool);
        self.instance.invoke(
            "update",
            &[json!(title), json!(text), opt(icon_name), opt(icon_path), resident],
        )?;
        Ok(())
    }

    pub fn set_actions<I, S>(&self, actions: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let actions: Vec<Value> = actions.into_iter().map(|a| Value::String(a.into())).collect();
        self.instance.invoke("set_actions", &[Value::Array(actions)])?;
        Ok(())
    }

    pub fn remove_actions(&self) -> Result<()> {
        self.instance.invoke("remove_actions", &[])?;
        Ok(())
    }

    /// Show the notification. With `force` it is shown even when the host
    /// would otherwise suppress it because the player window has focus.
    pub fn show(&self, force: bool) -> Result<()> {
        self.instance.invoke("show", &[json!(force)])?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Notifications {
    instance: Arc<Instance>,
    notification: Arc<Prototype>,
}

impl Notifications {
    pub fn new(prototype: &Arc<Prototype>, notification: &Arc<Prototype>) -> Result<Self> {
        Ok(Self {
            instance: Instance::new(prototype, &[])?,
            notification: Arc::clone(notification),
        })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn get_named_notification(
        &self,
        name: &str,
        resident: bool,
        category: Option<&str>,
    ) -> Result<Notification> {
        Notification::new(&self.notification, name, resident, category)
    }

    #[deprecated(since = "4.8", note = "use `is_persistence_supported_async`")]
    pub fn is_persistence_supported(&self) -> Result<bool> {
        let value = self
            .instance
            .invoke("is_persistence_supported", &[])?
            .into_value()?;
        Ok(truthy(Some(&value)))
    }

    pub async fn is_persistence_supported_async(&self) -> Result<bool> {
        let value = self
            .instance
            .invoke("is_persistence_supported_async", &[])?
            .into_deferred()
            .await?;
        Ok(truthy(Some(&value)))
    }

    pub fn show_notification(
        &self,
        title: &str,
        text: Option<&str>,
        icon_name: Option<&str>,
        icon_path: Option<&str>,
        force: bool,
        category: Option<&str>,
    ) -> Result<()> {
        self.instance.invoke(
            "show_notification",
            &[
                json!(title),
                opt(text),
                opt(icon_name),
                opt(icon_path),
                json!(force),
                opt(category),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{HostChannel, OutboundMessage, Result as BridgeResult};
    use core_runtime::BrokerConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl HostChannel for Recorder {
        fn send(&self, message: OutboundMessage) -> BridgeResult<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn setup() -> (Notifications, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let broker = Broker::new(BrokerConfig::default(), recorder.clone()).unwrap();
        let notifications = Notifications::new(
            &notifications_prototype(&broker).unwrap(),
            &notification_prototype(&broker).unwrap(),
        )
        .unwrap();
        (notifications, recorder)
    }

    fn last_args(recorder: &Recorder) -> Vec<Value> {
        recorder.sent.lock().unwrap().last().unwrap().arguments.clone()
    }

    #[test]
    fn test_update_reuses_stored_residency() {
        let (notifications, recorder) = setup();
        let n = notifications.get_named_notification("track", true, None).unwrap();
        assert_eq!(n.name(), "track");

        n.update("Song", "Artist", None, Some("/tmp/cover.png"), None).unwrap();
        assert_eq!(
            last_args(&recorder),
            vec![
                json!("track"),
                json!("Song"),
                json!("Artist"),
                json!(""),
                json!("/tmp/cover.png"),
                json!(true),
                json!(""),
            ]
        );

        n.update("Song", "Artist", Some("audio"), None, Some(false)).unwrap();
        assert!(!n.is_resident());
        n.update("Next", "", None, None, None).unwrap();
        assert_eq!(last_args(&recorder)[5], json!(false));
    }

    #[test]
    fn test_actions_and_show() {
        let (notifications, recorder) = setup();
        let n = notifications
            .get_named_notification("track", false, Some("x-nuvola.playback"))
            .unwrap();

        n.set_actions(["prev-song", "next-song"]).unwrap();
        n.remove_actions().unwrap();
        n.show(true).unwrap();

        let sent = recorder.sent.lock().unwrap();
        let ops: Vec<_> = sent.iter().map(|m| (m.operation.as_str(), m.arguments.clone())).collect();
        assert_eq!(
            ops,
            vec![
                (NOTIFICATION_SET_ACTIONS, vec![json!("track"), json!(["prev-song", "next-song"])]),
                (NOTIFICATION_REMOVE_ACTIONS, vec![json!("track")]),
                (NOTIFICATION_SHOW, vec![json!("track"), json!(true)]),
            ]
        );
    }

    #[test]
    fn test_category_reaches_update() {
        let (notifications, recorder) = setup();
        let n = notifications
            .get_named_notification("alert", false, Some("im"))
            .unwrap();
        n.update("Hi", "", None, None, None).unwrap();
        assert_eq!(last_args(&recorder)[6], json!("im"));
    }

    #[test]
    fn test_show_notification_defaults() {
        let (notifications, recorder) = setup();
        notifications
            .show_notification("Hello", None, None, None, false, None)
            .unwrap();
        assert_eq!(
            last_args(&recorder),
            vec![json!("Hello"), json!(""), json!(""), json!(""), json!(false), json!("")]
        );
        assert!(recorder.sent.lock().unwrap()[0].correlation_id.is_none());
    }

    #[test]
    fn test_nameless_notification_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let broker = Broker::new(BrokerConfig::default(), recorder).unwrap();
        let proto = notification_prototype(&broker).unwrap();
        assert!(Instance::new(&proto, &[]).is_err());
    }
}
