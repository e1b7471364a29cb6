// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Keelboot Hardware Abstraction Layer
//!
//! Platform-agnostic traits for the three peripherals the core touches:
//! flash, the random number generator and the authenticated watchdog
//! timer. Board crates implement these for their silicon; the `sim`
//! module provides the host doubles used by the test suites.

#![no_std]
#![warn(missing_docs)]

pub mod error;
pub mod sim;
pub mod traits;

pub use error::{HalError, HalResult};
pub use traits::{FlashInterface, RngInterface, WatchdogInterface};
