//! Tray icon and dock launcher.

use crate::error::Result;
use crate::operations::{
    text_or_empty, LAUNCHER_ADD_ACTION, LAUNCHER_REMOVE_ACTION, LAUNCHER_REMOVE_ACTIONS,
    LAUNCHER_SET_ACTIONS, LAUNCHER_SET_TOOLTIP,
};
use core_runtime::{Broker, Instance, Outcome, Prototype};
use serde_json::{json, Value};
use std::sync::Arc;

pub const PROTOTYPE_NAME: &str = "Launcher";

/// Forward `args`, reshaped by `shape`, to the host as a void call.
fn forward(
    broker: &Arc<Broker>,
    operation: &'static str,
    shape: fn(&[Value]) -> Vec<Value>,
) -> impl Fn(&Instance, &[Value]) -> core_runtime::Result<Outcome> + Send + Sync + 'static {
    let broker = Arc::clone(broker);
    move |_, args| {
        broker.call_void(operation, shape(args))?;
        Ok(Outcome::unit())
    }
}

fn first(args: &[Value]) -> Vec<Value> {
    vec![args.first().cloned().unwrap_or(Value::Null)]
}

pub fn prototype(broker: &Arc<Broker>) -> core_runtime::Result<Arc<Prototype>> {
    Prototype::builder(PROTOTYPE_NAME)
        .operation(
            "set_tooltip",
            forward(broker, LAUNCHER_SET_TOOLTIP, |args| vec![text_or_empty(args, 0)]),
        )
        .operation("set_actions", forward(broker, LAUNCHER_SET_ACTIONS, first))
        .operation("remove_actions", forward(broker, LAUNCHER_REMOVE_ACTIONS, |_| Vec::new()))
        .operation("add_action", forward(broker, LAUNCHER_ADD_ACTION, first))
        .operation("remove_action", forward(broker, LAUNCHER_REMOVE_ACTION, first))
        .build()
}

/// Typed handle over a `Launcher` instance.
///
/// Action names refer to actions the integration script registered with the
/// host; the launcher only lists them.
#[derive(Debug, Clone)]
pub struct Launcher {
    instance: Arc<Instance>,
}

impl Launcher {
    pub fn new(prototype: &Arc<Prototype>) -> Result<Self> {
        Ok(Self {
            instance: Instance::new(prototype, &[])?,
        })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn set_tooltip(&self, tooltip: &str) -> Result<()> {
        self.instance.invoke("set_tooltip", &[json!(tooltip)])?;
        Ok(())
    }

    /// Replace the whole action list.
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

    pub fn add_action(&self, action: &str) -> Result<()> {
        self.instance.invoke("add_action", &[json!(action)])?;
        Ok(())
    }

    pub fn remove_action(&self, action: &str) -> Result<()> {
        self.instance.invoke("remove_action", &[json!(action)])?;
        Ok(())
    }
}
