//! # Object Runtime
//!
//! Prototypes, mixins and instances.
//!
//! ## Overview
//!
//! A [`Prototype`] is an immutable, named table of operations. It may have
//! one parent and any number of [`Mixin`]s. At build time the table is
//! flattened once, so lookup is a single hash probe with this precedence:
//!
//! ```text
//! own operations  >  mixins (declaration order)  >  parent chain
//! ```
//!
//! Two mixins of the same prototype providing the same operation is a
//! [`Error::MixinConflict`]; an own operation with the same name simply
//! shadows the mixin.
//!
//! An [`Instance`] is created from a prototype with
//! [`Instance::new`]. Creation allocates field storage, registers every
//! signal declared along the chain (when the chain carries signal support)
//! and runs exactly one initializer: the nearest one found walking up from
//! the prototype. Initializers chain to their parent explicitly through
//! [`Prototype::initialize`].
//!
//! ## Example
//!
//! ```
//! use core_runtime::object::{Outcome, Prototype};
//! use serde_json::json;
//!
//! let greeter = Prototype::builder("Greeter")
//!     .initializer(|this, args| {
//!         this.set_field("name", args.first().cloned().unwrap_or(json!("world")));
//!         Ok(())
//!     })
//!     .operation("greet", |this, _| {
//!         let name = this.field("name").unwrap_or_default();
//!         Ok(Outcome::Value(json!(format!("hello {}", name.as_str().unwrap_or("?")))))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let instance = core_runtime::object::Instance::new(&greeter, &[json!("nuvola")]).unwrap();
//! let reply = instance.invoke("greet", &[]).unwrap().into_value().unwrap();
//! assert_eq!(reply, json!("hello nuvola"));
//! ```

use crate::broker::Deferred;
use crate::error::{Error, Result};
use crate::signals::Signals;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callable body of an operation.
pub type Operation = Arc<dyn Fn(&Instance, &[Value]) -> Result<Outcome> + Send + Sync>;

/// Initializer run once when an instance is created.
pub type Initializer = Arc<dyn Fn(&Instance, &[Value]) -> Result<()> + Send + Sync>;

/// What an operation hands back: an immediate value, or a deferred handle
/// for a host round trip still in flight.
pub enum Outcome {
    Value(Value),
    Deferred(Deferred),
}

impl Outcome {
    pub fn unit() -> Self {
        Outcome::Value(Value::Null)
    }

    /// The immediate value. A deferred outcome is a caller error here: use
    /// [`into_deferred`](Self::into_deferred) and await it instead.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Deferred(deferred) => Err(Error::Config(format!(
                "operation {} produced a deferred handle where a value was expected",
                deferred.operation()
            ))),
        }
    }

    /// A handle to await. Immediate values are wrapped in an already
    /// fulfilled handle.
    pub fn into_deferred(self) -> Deferred {
        match self {
            Outcome::Value(value) => Deferred::ready("immediate", value),
            Outcome::Deferred(deferred) => deferred,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<Deferred> for Outcome {
    fn from(deferred: Deferred) -> Self {
        Outcome::Deferred(deferred)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
        }
    }
}

// ============================================================================
// Mixin
// ============================================================================

/// A reusable bundle of operations and signal declarations.
#[derive(Clone)]
pub struct Mixin {
    name: String,
    operations: BTreeMap<String, Operation>,
    signals: Vec<String>,
    signal_support: bool,
}

impl Mixin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: BTreeMap::new(),
            signals: Vec::new(),
            signal_support: false,
        }
    }

    pub fn operation<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(body));
        self
    }

    /// Declare a signal. Implies signal support.
    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.signals.push(name.into());
        self.signal_support = true;
        self
    }

    /// Give instances of any prototype using this mixin a signal table.
    pub fn with_signal_support(mut self) -> Self {
        self.signal_support = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provides(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixin")
            .field("name", &self.name)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .field("signals", &self.signals)
            .finish()
    }
}

// ============================================================================
// Prototype
// ============================================================================

pub struct Prototype {
    name: String,
    parent: Option<Arc<Prototype>>,
    mixins: Vec<String>,
    operations: HashMap<String, Operation>,
    signals: Vec<String>,
    signal_support: bool,
    initializer: Option<Initializer>,
}

impl Prototype {
    pub fn builder(name: impl Into<String>) -> PrototypeBuilder {
        PrototypeBuilder {
            name: name.into(),
            parent: None,
            mixins: Vec::new(),
            operations: BTreeMap::new(),
            signals: Vec::new(),
            initializer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Prototype>> {
        self.parent.as_ref()
    }

    /// Names of the mixins applied directly to this prototype.
    pub fn mixins(&self) -> &[String] {
        &self.mixins
    }

    pub fn lookup(&self, operation: &str) -> Option<&Operation> {
        self.operations.get(operation)
    }

    pub fn responds_to(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Every signal declared along the chain, ancestors first.
    pub fn declared_signals(&self) -> &[String] {
        &self.signals
    }

    pub fn has_signal_support(&self) -> bool {
        self.signal_support
    }

    /// Whether `name` is this prototype or one of its ancestors.
    pub fn is_a(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(proto) = current {
            if proto.name == name {
                return true;
            }
            current = proto.parent.as_deref();
        }
        false
    }

    /// Run the nearest initializer at or above this prototype.
    ///
    /// Called by [`Instance::new`], and by initializers that want their
    /// parent's setup as well (`proto.parent()` then `initialize`).
    pub fn initialize(&self, instance: &Instance, args: &[Value]) -> Result<()> {
        let mut current = Some(self);
        while let Some(proto) = current {
            if let Some(init) = &proto.initializer {
                return init(instance, args);
            }
            current = proto.parent.as_deref();
        }
        Ok(())
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ops: Vec<_> = self.operations.keys().collect();
        ops.sort();
        f.debug_struct("Prototype")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("mixins", &self.mixins)
            .field("operations", &ops)
            .field("signals", &self.signals)
            .finish()
    }
}

pub struct PrototypeBuilder {
    name: String,
    parent: Option<Arc<Prototype>>,
    mixins: Vec<Mixin>,
    operations: BTreeMap<String, Operation>,
    signals: Vec<String>,
    initializer: Option<Initializer>,
}

impl PrototypeBuilder {
    pub fn parent(mut self, parent: &Arc<Prototype>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn mixin(mut self, mixin: Mixin) -> Self {
        self.mixins.push(mixin);
        self
    }

    pub fn operation<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(body));
        self
    }

    /// Declare a signal owned by this prototype. The chain must carry signal
    /// support, or [`build`](Self::build) fails.
    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.signals.push(name.into());
        self
    }

    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Flatten the operation table.
    ///
    /// # Errors
    ///
    /// - [`Error::MixinConflict`] if two mixins provide the same operation
    /// - [`Error::CapabilityMissing`] if signals are declared without signal support
    pub fn build(self) -> Result<Arc<Prototype>> {
        let mut operations = self
            .parent
            .as_ref()
            .map(|p| p.operations.clone())
            .unwrap_or_default();
        let mut signals = self
            .parent
            .as_ref()
            .map(|p| p.signals.clone())
            .unwrap_or_default();
        let mut signal_support = self.parent.as_ref().is_some_and(|p| p.signal_support);

        let mut provided_by: HashMap<&str, &str> = HashMap::new();
        for mixin in &self.mixins {
            for (op, body) in &mixin.operations {
                if let Some(first) = provided_by.insert(op.as_str(), mixin.name.as_str()) {
                    return Err(Error::MixinConflict {
                        prototype: self.name.clone(),
                        operation: op.clone(),
                        first: first.to_string(),
                        second: mixin.name.clone(),
                    });
                }
                operations.insert(op.clone(), Arc::clone(body));
            }
            signal_support |= mixin.signal_support;
            push_unique(&mut signals, &mixin.signals);
        }

        for (op, body) in self.operations {
            operations.insert(op, body);
        }

        if !self.signals.is_empty() && !signal_support {
            return Err(Error::CapabilityMissing {
                capability: "signals".to_string(),
                message: format!(
                    "{} declares signals {:?} but has no signal mixin in its chain",
                    self.name, self.signals
                ),
            });
        }
        push_unique(&mut signals, &self.signals);

        Ok(Arc::new(Prototype {
            name: self.name,
            parent: self.parent,
            mixins: self.mixins.into_iter().map(|m| m.name).collect(),
            operations,
            signals,
            signal_support,
            initializer: self.initializer,
        }))
    }
}

fn push_unique(into: &mut Vec<String>, names: &[String]) {
    for name in names {
        if !into.contains(name) {
            into.push(name.clone());
        }
    }
}

// ============================================================================
// Instance
// ============================================================================

/// A live object. Shared as `Arc<Instance>`; fields use interior mutability.
pub struct Instance {
    prototype: Arc<Prototype>,
    fields: Mutex<HashMap<String, Value>>,
    signals: Option<Signals>,
}

impl Instance {
    pub fn new(prototype: &Arc<Prototype>, args: &[Value]) -> Result<Arc<Instance>> {
        let signals = prototype.signal_support.then(|| {
            let table = Signals::new(prototype.name());
            for name in prototype.declared_signals() {
                table.add_signal(name);
            }
            table
        });

        let instance = Arc::new(Instance {
            prototype: Arc::clone(prototype),
            fields: Mutex::new(HashMap::new()),
            signals,
        });
        prototype.initialize(&instance, args)?;
        Ok(instance)
    }

    pub fn prototype(&self) -> &Arc<Prototype> {
        &self.prototype
    }

    pub fn prototype_name(&self) -> &str {
        self.prototype.name()
    }

    /// Resolve and run an operation.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchOperation`] if nothing along the chain provides it, or
    /// whatever the operation itself returns.
    pub fn invoke(&self, operation: &str, args: &[Value]) -> Result<Outcome> {
        let body = self
            .prototype
            .lookup(operation)
            .ok_or_else(|| Error::NoSuchOperation {
                prototype: self.prototype.name().to_string(),
                operation: operation.to_string(),
            })?;
        body(self, args)
    }

    fn lock_fields(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.lock_fields().insert(name.into(), value);
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.lock_fields().get(name).cloned()
    }

    /// The signal table.
    ///
    /// # Errors
    ///
    /// [`Error::CapabilityMissing`] if the prototype chain has no signal mixin.
    pub fn signals(&self) -> Result<&Signals> {
        self.signals.as_ref().ok_or_else(|| Error::CapabilityMissing {
            capability: "signals".to_string(),
            message: format!("{} was built without the signal mixin", self.prototype.name()),
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("prototype", &self.prototype.name())
            .field("fields", &*self.lock_fields())
            .finish()
    }
}
