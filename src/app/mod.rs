//! Application core: pure domain logic, zero I/O.
//!
//! This module orchestrates one wake cycle of the sensor node: sample,
//! store, decide, authenticate, drain, sleep. All interaction with hardware
//! happens through **port traits** defined in [`ports`], keeping this layer
//! fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
