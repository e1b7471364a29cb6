// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! HAL trait definitions
//!
//! The core owns these peripherals for exactly one run: flash and the
//! RNG from entry until handoff, the watchdog from arming onward (it
//! cannot be stopped once armed).

use keel_common::constants::{FLASH_ERASED_BYTE, FLASH_PAGE_SIZE};

use crate::error::HalResult;

/// Flash memory interface
///
/// Writes reprogram the enclosing 512-byte pages; callers stage a full
/// RAM copy of a record and write the whole structure at once, so a
/// torn write leaves each page either old or new.
pub trait FlashInterface {
    /// Read from flash into a buffer
    fn read(&self, address: u32, buf: &mut [u8]) -> HalResult<()>;

    /// Program flash
    ///
    /// Returns success iff the hardware acknowledged the whole write.
    fn write(&mut self, address: u32, data: &[u8]) -> HalResult<()>;

    /// Erase a range by programming the all-0xFF pattern
    ///
    /// `len` is rounded up to whole pages by the caller's region sizing;
    /// partial trailing pages are erased in full up to `len` bytes.
    fn erase(&mut self, address: u32, len: u32) -> HalResult<()> {
        let page = [FLASH_ERASED_BYTE; FLASH_PAGE_SIZE];
        let mut offset = 0u32;
        while offset < len {
            let chunk = (len - offset).min(FLASH_PAGE_SIZE as u32) as usize;
            self.write(address + offset, &page[..chunk])?;
            offset += chunk as u32;
        }
        Ok(())
    }
}

/// Random number generator interface
///
/// Used only for ECDSA signing nonces. The core deinitializes the RNG
/// immediately before handing off to the next layer.
pub trait RngInterface {
    /// Fill a buffer with random bytes
    fn fill_bytes(&mut self, dest: &mut [u8]) -> HalResult<()>;

    /// Shut the peripheral down; no further draws are possible
    fn deinit(&mut self) {}
}

/// Authenticated watchdog timer interface
pub trait WatchdogInterface {
    /// Arm the watchdog with the given deferral
    ///
    /// Called exactly once near the end of boot. Once armed the
    /// watchdog cannot be stopped; the next layer must obtain deferral
    /// tickets in time or the device resets into the pre-boot stage.
    fn init(&mut self, timeout_s: u32) -> HalResult<()>;

    /// Check whether the last reset was caused by watchdog expiry
    fn was_watchdog_reset(&self) -> bool;
}
