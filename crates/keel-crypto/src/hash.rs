// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! SHA-256 hashing
//!
//! One-shot, two-part and incremental interfaces over the same
//! function. The incremental form exists so staging payloads and image
//! code segments can be digested straight out of flash in small chunks.

use sha2::Digest;

pub use keel_common::constants::DIGEST_SIZE;

/// SHA-256 digest type
pub type Sha256Digest = [u8; DIGEST_SIZE];

/// Hash a message in one shot
#[must_use]
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(sha2::Sha256::digest(data).as_slice());
    out
}

/// Hash the concatenation `a ‖ b` without materializing it
#[must_use]
pub fn sha256_two_parts(a: &[u8], b: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize()
}

/// Incremental SHA-256 hasher
pub struct Sha256 {
    inner: sha2::Sha256,
}

impl Sha256 {
    /// Create a fresh hasher
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: sha2::Sha256::new(),
        }
    }

    /// Absorb data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the digest
    #[must_use]
    pub fn finalize(self) -> Sha256Digest {
        let mut out = [0u8; DIGEST_SIZE];
        out.copy_from_slice(self.inner.finalize().as_slice());
        out
    }
}

impl Default for Sha256 {
    fn default() -> Self {
        Self::new()
    }
}
