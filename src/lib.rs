//! CWA sensor firmware library.
//!
//! Exposes the wake-cycle core and its adapters for integration testing and
//! host-side inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod frame;
pub mod ota;
pub mod portal;
pub mod scan;
pub mod scheduler;
pub mod store;
pub mod upload;

// Device adapters; each carries a simulation backend for host builds.
pub mod adapters;

pub use error::{Error, Result};
