//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `bridge-loopback`). Integration scripts
//! can depend on `nuvola-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(feature = "service")]
pub use core_service as service;

#[cfg(feature = "loopback")]
pub use bridge_loopback as loopback;
