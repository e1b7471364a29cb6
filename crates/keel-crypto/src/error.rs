// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Crypto error types

use keel_common::Error;

/// Result type alias for crypto operations
pub type CryptoResult<T> = core::result::Result<T, CryptoError>;

/// Crypto error type
///
/// Deliberately coarse: verification failures collapse into
/// [`CryptoError::BadSignature`] with no sub-reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key bytes do not decode to a valid key
    InvalidKey,
    /// Signature verification failed
    BadSignature,
    /// Signing failed
    Signing,
    /// Seed could not be mapped into the scalar field
    KeyDerivation,
    /// Random number generator failure
    RngFailure,
    /// PEM encoding or decoding failed
    Pem,
    /// Output buffer is too small
    BufferTooSmall,
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKey => Error::Corrupted,
            CryptoError::BadSignature => Error::BadSignature,
            CryptoError::Signing => Error::InternalError,
            CryptoError::KeyDerivation => Error::KeyDerivation,
            CryptoError::RngFailure => Error::RngFailure,
            CryptoError::Pem => Error::PemError,
            CryptoError::BufferTooSmall => Error::BufferTooSmall,
        }
    }
}
