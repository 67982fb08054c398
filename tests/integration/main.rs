//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters. All tests run on the host with no real hardware
//! required.

mod mocks;
mod portal_tests;
mod upload_tests;
mod wake_cycle_tests;
