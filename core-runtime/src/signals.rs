//! # Signal Mixin
//!
//! Named, synchronous event channels attached to an [`Instance`].
//!
//! A prototype gains a signal table by including [`mixin()`] (or any mixin
//! built with [`Mixin::with_signal_support`]). Subscribers are called in
//! connection order. Each emission iterates a snapshot of the subscriber list
//! taken when it starts, so a callback may disconnect itself (or others)
//! without disturbing the delivery in progress.
//!
//! ```
//! use core_runtime::object::{Instance, Prototype};
//! use core_runtime::signals;
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! let proto = Prototype::builder("Player")
//!     .mixin(signals::mixin())
//!     .signal("TrackChanged")
//!     .build()
//!     .unwrap();
//! let player = Instance::new(&proto, &[]).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! player
//!     .signals()
//!     .unwrap()
//!     .connect("TrackChanged", move |args| sink.lock().unwrap().push(args[0].clone()))
//!     .unwrap();
//!
//! player.signals().unwrap().emit("TrackChanged", &[json!("Song 2")]).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![json!("Song 2")]);
//! ```

use crate::error::{Error, Result};
use crate::object::{Instance, Mixin, Outcome};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Name under which [`mixin()`] is registered.
pub const MIXIN_NAME: &str = "SignalsMixin";

pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle returned by [`Signals::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    signal: String,
    id: u64,
}

impl Subscription {
    pub fn signal(&self) -> &str {
        &self.signal
    }
}

#[derive(Default)]
struct SignalTable {
    next_id: u64,
    subscribers: HashMap<String, Vec<(u64, Callback)>>,
}

/// Per-instance signal table.
pub struct Signals {
    owner: String,
    table: Mutex<SignalTable>,
}

impl Signals {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            table: Mutex::new(SignalTable::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn undeclared(&self, signal: &str) -> Error {
        Error::UndeclaredSignal {
            owner: self.owner.clone(),
            signal: signal.to_string(),
        }
    }

    /// Declare a signal. Declaring it again is a no-op.
    pub fn add_signal(&self, name: &str) {
        self.lock().subscribers.entry(name.to_string()).or_default();
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lock().subscribers.contains_key(name)
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.lock().subscribers.get(name).map_or(0, Vec::len)
    }

    pub fn connect<F>(&self, name: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        let list = table
            .subscribers
            .get_mut(name)
            .ok_or_else(|| self.undeclared(name))?;
        list.push((id, Arc::new(callback)));
        Ok(Subscription {
            signal: name.to_string(),
            id,
        })
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn disconnect(&self, subscription: &Subscription) -> bool {
        let mut table = self.lock();
        let Some(list) = table.subscribers.get_mut(&subscription.signal) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        list.len() != before
    }

    /// Deliver `args` to every subscriber connected when the call starts.
    ///
    /// Returns how many subscribers were called. Zero subscribers is fine;
    /// an undeclared signal is [`Error::UndeclaredSignal`].
    pub fn emit(&self, name: &str, args: &[Value]) -> Result<usize> {
        let snapshot: Vec<Callback> = {
            let table = self.lock();
            let list = table
                .subscribers
                .get(name)
                .ok_or_else(|| self.undeclared(name))?;
            list.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in &snapshot {
            callback(args);
        }
        Ok(snapshot.len())
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.lock();
        let mut counts: Vec<_> = table
            .subscribers
            .iter()
            .map(|(name, subs)| (name.clone(), subs.len()))
            .collect();
        counts.sort();
        f.debug_struct("Signals")
            .field("owner", &self.owner)
            .field("subscribers", &counts)
            .finish()
    }
}

fn signal_name(args: &[Value], operation: &str) -> Result<String> {
    args.first()
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Config(format!("{operation} expects a signal name as first argument")))
}

/// The signal mixin: gives instances a signal table and exposes
/// `add_signal(name)` and `emit(name, ...args)` as operations.
pub fn mixin() -> Mixin {
    Mixin::new(MIXIN_NAME)
        .with_signal_support()
        .operation("add_signal", |this: &Instance, args: &[Value]| {
            let name = signal_name(args, "add_signal")?;
            this.signals()?.add_signal(&name);
            Ok(Outcome::unit())
        })
        .operation("emit", |this: &Instance, args: &[Value]| {
            let name = signal_name(args, "emit")?;
            let delivered = this.signals()?.emit(&name, &args[1..])?;
            Ok(Outcome::Value(Value::from(delivered)))
        })
}
