use bridge_traits::BridgeError;
use thiserror::Error;

/// Programmer-facing failures: misconfigured prototypes, undeclared signals
/// and misuse of the blocking call shape. These are never delivered through a
/// deferred handle; they surface at definition or call time.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("No such operation: {prototype}.{operation}")]
    NoSuchOperation {
        prototype: String,
        operation: String,
    },

    #[error("Mixin conflict in {prototype}: operation '{operation}' is provided by both {first} and {second}")]
    MixinConflict {
        prototype: String,
        operation: String,
        first: String,
        second: String,
    },

    #[error("Undeclared signal '{signal}' on {owner}")]
    UndeclaredSignal { owner: String, signal: String },

    #[error("Reentrant blocking call: {operation} issued while another resolution is in progress")]
    ReentrantBlockingCall { operation: String },

    #[error("Blocking call {operation} issued from inside an async runtime; use the deferred variant")]
    BlockingInAsyncContext { operation: String },

    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Data errors: the outcome of a call that was issued correctly but failed.
///
/// Faults are values. They reject deferred handles and are returned from
/// blocking calls without disturbing other in-flight calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Transport fault: {0}")]
    Transport(String),

    #[error("Remote fault [{code}]: {message}")]
    Remote { code: String, message: String },

    #[error("Protocol fault: {0}")]
    Protocol(String),

    #[error("Validation fault: {0}")]
    LocalValidation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

impl Fault {
    /// Short machine-readable tag, stable across releases.
    pub fn code(&self) -> &str {
        match self {
            Fault::Transport(_) => "transport",
            Fault::Remote { code, .. } => code,
            Fault::Protocol(_) => "protocol",
            Fault::LocalValidation(_) => "validation",
            Fault::KeyNotFound(_) => "key-not-found",
        }
    }
}

impl From<BridgeError> for Fault {
    fn from(err: BridgeError) -> Self {
        Fault::Transport(err.to_string())
    }
}

impl From<BridgeError> for Error {
    fn from(err: BridgeError) -> Self {
        Error::Fault(err.into())
    }
}

impl Error {
    /// The fault carried by this error, if it is a data error.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Error::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
