// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! RNG interface for signing
//!
//! The facade does not talk to hardware; callers hand in an entropy
//! source through [`CryptoRng`]. Internally the source is bridged to
//! the `rand_core` traits the signature implementation expects, with
//! failure latched so a dead RNG surfaces as an error instead of a
//! silently degenerate nonce.

use core::num::NonZeroU32;

use crate::error::CryptoError;

/// Cryptographically secure random number source
pub trait CryptoRng {
    /// Fill `dest` with random bytes
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

const RNG_FAILED: NonZeroU32 = match NonZeroU32::new(rand_core::Error::CUSTOM_START + 1) {
    Some(code) => code,
    None => NonZeroU32::MIN,
};

/// Bridge from [`CryptoRng`] to the `rand_core` traits
///
/// `rand_core`'s infallible `fill_bytes` cannot report a dead source,
/// so failures are latched in [`RngBridge::failed`] and checked by the
/// caller after the signing operation.
pub(crate) struct RngBridge<'a, R: CryptoRng> {
    pub inner: &'a mut R,
    pub failed: bool,
}

impl<'a, R: CryptoRng> RngBridge<'a, R> {
    pub fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<R: CryptoRng> rand_core::RngCore for RngBridge<'_, R> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if self.inner.fill_bytes(dest).is_err() {
            self.failed = true;
            dest.fill(0);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.inner.fill_bytes(dest).map_err(|_| {
            self.failed = true;
            rand_core::Error::from(RNG_FAILED)
        })
    }
}

impl<R: CryptoRng> rand_core::CryptoRng for RngBridge<'_, R> {}
