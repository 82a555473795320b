use core_runtime::{Error as RuntimeError, Fault};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Page API initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("Runtime error: {0}")]
    Runtime(RuntimeError),
}

impl From<RuntimeError> for ServiceError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Fault(fault) => ServiceError::Fault(fault),
            other => ServiceError::Runtime(other),
        }
    }
}

impl ServiceError {
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            ServiceError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
