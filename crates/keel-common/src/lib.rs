// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Keelboot Common Library
//!
//! Shared foundation for the Keelboot trusted-boot core: the unified
//! error type, the trace log buffer, the fixed memory layout and the
//! small set of types every layer speaks (boot modes, image kinds,
//! record size constants).
//!
//! # Features
//!
//! - `trace`: compile the trace macros in (default). Without it the
//!   `log_*!` macros expand to nothing.
//! - `defmt`: emit `defmt::Format` impls for embedded probe logging.
//!
//! # Security
//!
//! Nothing in this crate touches key material. Sensitive buffers live
//! in `keel-crypto` and `keel-core`, which own their zeroization.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod log;
pub mod types;

pub use config::MemoryLayout;
pub use errors::{Error, Result};
pub use types::{BootMode, ImageKind, PemBuf};
