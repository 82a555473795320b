//! Multimedia keys.
//!
//! The host grabs the keyboard's media keys and reports presses as
//! `MediaKeyPressed` events. Integration scripts subscribe with
//! [`MediaKeys::connect_pressed`].

use crate::error::Result;
use crate::operations::SIGNAL_MEDIA_KEY_PRESSED;
use core_runtime::{signals, Broker, Instance, Prototype, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub const PROTOTYPE_NAME: &str = "MediaKeys";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKey {
    Play,
    Pause,
    Stop,
    #[serde(rename = "Previous")]
    Prev,
    Next,
}

impl MediaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKey::Play => "Play",
            MediaKey::Pause => "Pause",
            MediaKey::Stop => "Stop",
            MediaKey::Prev => "Previous",
            MediaKey::Next => "Next",
        }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Play" => Ok(MediaKey::Play),
            "Pause" => Ok(MediaKey::Pause),
            "Stop" => Ok(MediaKey::Stop),
            "Previous" => Ok(MediaKey::Prev),
            "Next" => Ok(MediaKey::Next),
            other => Err(format!("unknown media key '{other}'")),
        }
    }
}

pub fn prototype() -> core_runtime::Result<Arc<Prototype>> {
    Prototype::builder(PROTOTYPE_NAME)
        .mixin(signals::mixin())
        .initializer(|this, _| {
            this.signals()?.add_signal(SIGNAL_MEDIA_KEY_PRESSED);
            Ok(())
        })
        .build()
}

#[derive(Debug, Clone)]
pub struct MediaKeys {
    instance: Arc<Instance>,
}

impl MediaKeys {
    /// Create the instance and route host `MediaKeyPressed` events to it.
    pub fn new(prototype: &Arc<Prototype>, broker: &Broker) -> Result<Self> {
        let instance = Instance::new(prototype, &[])?;
        broker.route_signal(SIGNAL_MEDIA_KEY_PRESSED, &instance)?;
        Ok(Self { instance })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Call `handler` for every key press the host reports. Events carrying
    /// an unrecognised key are logged and skipped.
    pub fn connect_pressed<F>(&self, handler: F) -> Result<Subscription>
    where
        F: Fn(MediaKey) + Send + Sync + 'static,
    {
        let subscription = self
            .instance
            .signals()?
            .connect(SIGNAL_MEDIA_KEY_PRESSED, move |args| {
                match args.first().and_then(Value::as_str).map(str::parse::<MediaKey>) {
                    Some(Ok(key)) => handler(key),
                    Some(Err(err)) => warn!(error = %err, "ignoring media key event"),
                    None => warn!("media key event without a key name"),
                }
            })?;
        Ok(subscription)
    }

    pub fn disconnect(&self, subscription: &Subscription) -> Result<bool> {
        Ok(self.instance.signals()?.disconnect(subscription))
    }
}
