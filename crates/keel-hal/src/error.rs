// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! HAL error types

use keel_common::Error;

/// Result type alias for HAL operations
pub type HalResult<T> = core::result::Result<T, HalError>;

/// HAL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Flash operation did not acknowledge
    Flash,
    /// Access outside the device's address range
    OutOfBounds,
    /// Random number generator failure
    Rng,
    /// Watchdog peripheral rejected the operation
    Watchdog,
}

impl From<HalError> for Error {
    fn from(e: HalError) -> Self {
        match e {
            HalError::Flash | HalError::OutOfBounds => Error::FlashError,
            HalError::Rng => Error::RngFailure,
            HalError::Watchdog => Error::WatchdogError,
        }
    }
}
