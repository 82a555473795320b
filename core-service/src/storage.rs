//! Key-value storage kept by the host.
//!
//! Three prototypes share one implementation:
//!
//! | Prototype | Index | Lifetime | Signals |
//! |-----------|-------|----------|---------|
//! | `KeyValueStorage` | given | - | - |
//! | `ConfigStorage` | 0 | persistent | `ConfigChanged(key)` |
//! | `SessionStorage` | 1 | until the player quits | - |
//!
//! Only scalar values can be stored. A value containing a JSON object is
//! rejected with [`Fault::LocalValidation`] before anything is sent.
//!
//! Reading a key that has neither a value nor a default fails with
//! [`Fault::KeyNotFound`].

use crate::error::{Result, ServiceError};
use crate::operations::{
    resolve_lookup, truthy, SIGNAL_CONFIG_CHANGED, STORAGE_GET_VALUE, STORAGE_HAS_KEY,
    STORAGE_SET_DEFAULT, STORAGE_SET_VALUE,
};
use core_runtime::{signals, Broker, Error, Fault, Instance, Outcome, Prototype, Subscription};
use serde_json::{json, Value};
use std::ops::Deref;
use std::sync::Arc;
use tracing::warn;

pub const KEY_VALUE_PROTOTYPE: &str = "KeyValueStorage";
pub const CONFIG_PROTOTYPE: &str = "ConfigStorage";
pub const SESSION_PROTOTYPE: &str = "SessionStorage";

pub const CONFIG_INDEX: u64 = 0;
pub const SESSION_INDEX: u64 = 1;

const OBJECTS_REJECTED: &str =
    "Key-value storage is for primitive types only. It is not yet possible to store objects.";

/// Reject values that contain a JSON object anywhere.
pub fn ensure_storable(value: &Value) -> std::result::Result<(), Fault> {
    match value {
        Value::Object(_) => Err(Fault::LocalValidation(OBJECTS_REJECTED.to_string())),
        Value::Array(items) => items.iter().try_for_each(ensure_storable),
        _ => Ok(()),
    }
}

fn index_of(this: &Instance) -> core_runtime::Result<Value> {
    this.field("index")
        .ok_or_else(|| Error::Config(format!("{} instance has no storage index", this.prototype_name())))
}

fn key_arg(args: &[Value], operation: &str) -> core_runtime::Result<Value> {
    match args.first() {
        Some(key @ Value::String(_)) => Ok(key.clone()),
        _ => Err(Error::Config(format!("{operation} expects a string key"))),
    }
}

fn value_arg(args: &[Value]) -> Value {
    args.get(1).cloned().unwrap_or(Value::Null)
}

fn deprecated(operation: &str) {
    warn!("KeyValueStorage.{operation} is deprecated since Nuvola 4.8. Use async variant instead.");
}

/// Root storage prototype. Instances are created with `[index]`.
pub fn key_value_prototype(broker: &Arc<Broker>) -> core_runtime::Result<Arc<Prototype>> {
    let b = |broker: &Arc<Broker>| Arc::clone(broker);
    let (set_default, set_default_async) = (b(broker), b(broker));
    let (has_key, has_key_async) = (b(broker), b(broker));
    let (get, get_async) = (b(broker), b(broker));
    let (set, set_async) = (b(broker), b(broker));

    Prototype::builder(KEY_VALUE_PROTOTYPE)
        .initializer(|this, args| {
            let index = args
                .first()
                .filter(|v| v.is_u64())
                .ok_or_else(|| Error::Config("storage index must be a non-negative integer".into()))?;
            this.set_field("index", index.clone());
            Ok(())
        })
        .operation("set_default", move |this, args| {
            deprecated("set_default");
            let value = value_arg(args);
            ensure_storable(&value)?;
            let call = vec![index_of(this)?, key_arg(args, "set_default")?, value];
            set_default.call_blocking(STORAGE_SET_DEFAULT, call)?;
            Ok(Outcome::unit())
        })
        .operation("set_default_async", move |this, args| {
            let index = index_of(this)?;
            let key = key_arg(args, "set_default_async")?;
            let value = value_arg(args);
            Ok(set_default_async
                .begin(STORAGE_SET_DEFAULT, move |_| {
                    ensure_storable(&value)?;
                    Ok(vec![index, key, value])
                })
                .into())
        })
        .operation("has_key", move |this, args| {
            deprecated("has_key");
            let call = vec![index_of(this)?, key_arg(args, "has_key")?];
            Ok(Outcome::Value(has_key.call_blocking(STORAGE_HAS_KEY, call)?))
        })
        .operation("has_key_async", move |this, args| {
            let call = vec![index_of(this)?, key_arg(args, "has_key_async")?];
            Ok(has_key_async.call(STORAGE_HAS_KEY, call).into())
        })
        .operation("get", move |this, args| {
            deprecated("get");
            let call = vec![index_of(this)?, key_arg(args, "get")?];
            Ok(Outcome::Value(get.call_blocking(STORAGE_GET_VALUE, call)?))
        })
        .operation("get_async", move |this, args| {
            let call = vec![index_of(this)?, key_arg(args, "get_async")?];
            Ok(get_async.call(STORAGE_GET_VALUE, call).into())
        })
        .operation("set", move |this, args| {
            deprecated("set");
            let value = value_arg(args);
            ensure_storable(&value)?;
            let call = vec![index_of(this)?, key_arg(args, "set")?, value];
            set.call_blocking(STORAGE_SET_VALUE, call)?;
            Ok(Outcome::unit())
        })
        .operation("set_async", move |this, args| {
            let index = index_of(this)?;
            let key = key_arg(args, "set_async")?;
            let value = value_arg(args);
            Ok(set_async
                .begin(STORAGE_SET_VALUE, move |_| {
                    ensure_storable(&value)?;
                    Ok(vec![index, key, value])
                })
                .into())
        })
        .build()
}

/// Persistent configuration: storage 0 with a `ConfigChanged` signal.
pub fn config_prototype(parent: &Arc<Prototype>) -> core_runtime::Result<Arc<Prototype>> {
    let base = Arc::clone(parent);
    Prototype::builder(CONFIG_PROTOTYPE)
        .parent(parent)
        .mixin(signals::mixin())
        .signal(SIGNAL_CONFIG_CHANGED)
        .initializer(move |this, _| base.initialize(this, &[json!(CONFIG_INDEX)]))
        .build()
}

/// Session storage: index 1, dropped when the player quits.
pub fn session_prototype(parent: &Arc<Prototype>) -> core_runtime::Result<Arc<Prototype>> {
    let base = Arc::clone(parent);
    Prototype::builder(SESSION_PROTOTYPE)
        .parent(parent)
        .initializer(move |this, _| base.initialize(this, &[json!(SESSION_INDEX)]))
        .build()
}

// ============================================================================
// Typed handles
// ============================================================================

fn settle_lookup(result: core_runtime::Result<Value>, key: &str) -> Result<Value> {
    match result {
        Ok(value) => Ok(resolve_lookup(Ok(value), key)?),
        Err(Error::Fault(fault)) => Ok(resolve_lookup(Err(fault), key)?),
        Err(other) => Err(ServiceError::from(other)),
    }
}

#[derive(Debug, Clone)]
pub struct KeyValueStorage {
    instance: Arc<Instance>,
}

impl KeyValueStorage {
    pub fn new(prototype: &Arc<Prototype>, index: u64) -> Result<Self> {
        Ok(Self {
            instance: Instance::new(prototype, &[json!(index)])?,
        })
    }

    pub(crate) fn from_instance(instance: Arc<Instance>) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn index(&self) -> Option<u64> {
        self.instance.field("index").and_then(|v| v.as_u64())
    }

    fn blocking(&self, operation: &str, args: &[Value]) -> core_runtime::Result<Value> {
        self.instance.invoke(operation, args)?.into_value()
    }

    async fn deferred(&self, operation: &str, args: &[Value]) -> Result<Value> {
        Ok(self.instance.invoke(operation, args)?.into_deferred().await?)
    }

    /// Value returned by `get` while no value has been set.
    #[deprecated(since = "4.8", note = "use `set_default_async`")]
    pub fn set_default(&self, key: &str, value: Value) -> Result<()> {
        self.blocking("set_default", &[json!(key), value])?;
        Ok(())
    }

    pub async fn set_default_async(&self, key: &str, value: Value) -> Result<()> {
        self.deferred("set_default_async", &[json!(key), value]).await?;
        Ok(())
    }

    /// `false` unless a value was stored for `key`; a default alone does
    /// not count.
    #[deprecated(since = "4.8", note = "use `has_key_async`")]
    pub fn has_key(&self, key: &str) -> Result<bool> {
        let value = self.blocking("has_key", &[json!(key)])?;
        Ok(truthy(Some(&value)))
    }

    pub async fn has_key_async(&self, key: &str) -> Result<bool> {
        let value = self.deferred("has_key_async", &[json!(key)]).await?;
        Ok(truthy(Some(&value)))
    }

    #[deprecated(since = "4.8", note = "use `get_async`")]
    pub fn get(&self, key: &str) -> Result<Value> {
        settle_lookup(self.blocking("get", &[json!(key)]), key)
    }

    pub async fn get_async(&self, key: &str) -> Result<Value> {
        let deferred = self.instance.invoke("get_async", &[json!(key)])?.into_deferred();
        Ok(resolve_lookup(deferred.await, key)?)
    }

    #[deprecated(since = "4.8", note = "use `set_async`")]
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.blocking("set", &[json!(key), value])?;
        Ok(())
    }

    pub async fn set_async(&self, key: &str, value: Value) -> Result<()> {
        self.deferred("set_async", &[json!(key), value]).await?;
        Ok(())
    }
}

/// Persistent configuration handle.
///
/// Dereferences to [`KeyValueStorage`] for the storage operations.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    storage: KeyValueStorage,
}

impl ConfigStorage {
    /// Create the instance and route host `ConfigChanged` events to it.
    pub fn new(prototype: &Arc<Prototype>, broker: &Broker) -> Result<Self> {
        let instance = Instance::new(prototype, &[])?;
        broker.route_signal(SIGNAL_CONFIG_CHANGED, &instance)?;
        Ok(Self {
            storage: KeyValueStorage::from_instance(instance),
        })
    }

    /// Call `handler` with the key of every changed configuration value.
    pub fn connect_changed<F>(&self, handler: F) -> Result<Subscription>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let subscription = self
            .storage
            .instance
            .signals()?
            .connect(SIGNAL_CONFIG_CHANGED, move |args| {
                if let Some(key) = args.first().and_then(Value::as_str) {
                    handler(key);
                }
            })?;
        Ok(subscription)
    }

    pub fn disconnect(&self, subscription: &Subscription) -> Result<bool> {
        Ok(self.storage.instance.signals()?.disconnect(subscription))
    }
}

impl Deref for ConfigStorage {
    type Target = KeyValueStorage;

    fn deref(&self) -> &KeyValueStorage {
        &self.storage
    }
}
