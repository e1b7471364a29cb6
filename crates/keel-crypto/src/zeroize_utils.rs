// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Secure memory utilities
//!
//! Volatile zeroization and constant-time predicates. Everything the
//! boot path compares for acceptance (digests, nonces, MAC tags) goes
//! through [`constant_time_eq`].

use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

/// Securely zero memory, preventing compiler optimization
///
/// Volatile byte writes followed by a compiler fence so the stores
/// cannot be elided even when the buffer is dead afterwards.
#[inline(never)]
pub fn secure_zero(data: &mut [u8]) {
    for byte in data.iter_mut() {
        // SAFETY: writing to memory we hold a mutable reference to
        unsafe {
            ptr::write_volatile(byte, 0);
        }
    }
    compiler_fence(Ordering::SeqCst);
}

/// Compare two byte slices in constant time
///
/// Length mismatch returns false immediately; lengths are not secret in
/// this system, only contents are.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Check if all bytes are zero in constant time
#[must_use]
pub fn is_zero(data: &[u8]) -> bool {
    let mut acc: u8 = 0;
    for &byte in data {
        acc |= byte;
    }
    acc == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_zero_clears() {
        let mut data = [0xFFu8; 64];
        secure_zero(&mut data);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2]));
        assert!(constant_time_eq(&[], &[]));
    }

    #[test]
    fn is_zero_semantics() {
        assert!(is_zero(&[0; 32]));
        assert!(!is_zero(&[0, 0, 1]));
        assert!(is_zero(&[]));
    }
}
