// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Keelboot Core
//!
//! The boot-decision and trust-derivation engine of a resilient
//! embedded device. The core runs between the hardware-rooted pre-boot
//! stage and the next executable layer and is responsible for:
//!
//! - deriving the device's cryptographic identity (DeviceID) from the
//!   compound device secret handed over by the pre-boot stage, and a
//!   volatile AliasID bound to the measurement of the next layer;
//! - verifying and selecting the next layer (core patcher, update
//!   downloader or application);
//! - applying authenticated updates staged by the management service;
//! - arming the authenticated watchdog that forces the device back into
//!   a recoverable state when the management service is unreachable.
//!
//! The entry point is [`selector::run`]. Platform integration owns the
//! linker script, the reset handler and the peripheral drivers; it
//! hands the engine a [`selector::CoreEnv`] plus the two RAM windows
//! shared with the neighbouring stages.
//!
//! # Recovery policy
//!
//! The application is the only layer whose verification failure is
//! survivable: the core then boots the update downloader and flags that
//! new firmware is needed. An unverifiable downloader or core patcher
//! is fatal, because those are the layers that would repair the device.

#![no_std]
#![warn(missing_docs)]

pub mod certstore;
pub mod identity;
pub mod image;
pub mod params;
pub mod regions;
pub mod selector;
pub mod staging;
pub mod store;
pub mod update;

pub use selector::{BootDecision, CoreEnv};
