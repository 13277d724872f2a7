//! PinBridge firmware library.
//!
//! Exposes the bridge, registry and supervisor for integration testing.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod aggregator;
pub mod app;
pub mod bridge;
pub mod config;
pub mod drivers;
pub mod endpoint;
pub mod error;
pub mod power;
pub mod registry;
pub mod retry;
