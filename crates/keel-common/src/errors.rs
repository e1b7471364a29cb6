// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Error types for the Keelboot core
//!
//! One unified error enum for the whole boot path. All variants are
//! `Copy` and carry no payload so that error handling never allocates
//! and error values can cross the `no_std` crate boundary freely.

use core::fmt;

/// Result type alias for Keelboot operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the Keelboot core
///
/// Variants are grouped by subsystem; [`Error::code`] returns a stable
/// numeric code per variant for trace output and host tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Input Errors (0x01xx)
    // =========================================================================
    /// Malformed input: boot parameters or a header failed structural checks
    InvalidInput,

    // =========================================================================
    // Provisioning / Structure Errors (0x02xx)
    // =========================================================================
    /// Trust anchors or a required image header lacks its magic value
    NotProvisioned,
    /// Magic mismatch mid-scan of a structure expected to be valid
    Corrupted,

    // =========================================================================
    // Cryptographic Errors (0x03xx)
    // =========================================================================
    /// ECDSA signature verification failed
    BadSignature,
    /// SHA-256 digest mismatch
    BadDigest,
    /// Key derivation from a seed failed
    KeyDerivation,
    /// Random number generator failure
    RngFailure,
    /// PEM encoding or decoding failed
    PemError,

    // =========================================================================
    // Staging / Update Errors (0x04xx)
    // =========================================================================
    /// Staging element nonce does not match the current boot nonce
    StaleNonce,
    /// Image version or issue time older than persisted metadata
    Rollback,
    /// Requested staging element type is absent
    NotFound,

    // =========================================================================
    // Hardware Errors (0x05xx)
    // =========================================================================
    /// Flash write did not acknowledge
    FlashError,
    /// Watchdog peripheral rejected the operation
    WatchdogError,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Buffer is too small for the operation
    BufferTooSmall,
    /// Internal error (should not occur)
    InternalError,
}

impl Error {
    /// Get the stable error code for this error
    ///
    /// Codes are organized by category:
    /// - 0x01xx: input errors
    /// - 0x02xx: provisioning / structure errors
    /// - 0x03xx: cryptographic errors
    /// - 0x04xx: staging / update errors
    /// - 0x05xx: hardware errors
    /// - 0xFFxx: general errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidInput => 0x0101,

            Self::NotProvisioned => 0x0201,
            Self::Corrupted => 0x0202,

            Self::BadSignature => 0x0301,
            Self::BadDigest => 0x0302,
            Self::KeyDerivation => 0x0303,
            Self::RngFailure => 0x0304,
            Self::PemError => 0x0305,

            Self::StaleNonce => 0x0401,
            Self::Rollback => 0x0402,
            Self::NotFound => 0x0403,

            Self::FlashError => 0x0501,
            Self::WatchdogError => 0x0502,

            Self::BufferTooSmall => 0xFF01,
            Self::InternalError => 0xFFFF,
        }
    }

    /// Check if this is a security-relevant rejection
    ///
    /// Security errors indicate an input that failed an authenticity,
    /// integrity or freshness check, as opposed to a malfunction.
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::BadSignature
                | Self::BadDigest
                | Self::StaleNonce
                | Self::Rollback
                | Self::Corrupted
        )
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid input",
            Self::NotProvisioned => "not provisioned",
            Self::Corrupted => "structure corrupted",
            Self::BadSignature => "signature verification failed",
            Self::BadDigest => "digest mismatch",
            Self::KeyDerivation => "key derivation failed",
            Self::RngFailure => "RNG failure",
            Self::PemError => "PEM coding failed",
            Self::StaleNonce => "stale nonce",
            Self::Rollback => "version rollback",
            Self::NotFound => "not found",
            Self::FlashError => "flash error",
            Self::WatchdogError => "watchdog error",
            Self::BufferTooSmall => "buffer too small",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}
