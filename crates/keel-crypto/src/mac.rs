// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! HMAC-SHA-256
//!
//! Used for exactly one thing in the boot path: deriving `dev_auth`,
//! the tag binding the DeviceID public key to the device UUID under the
//! core authentication key.

use hmac::{Hmac, Mac};

use crate::error::CryptoError;

type HmacSha256 = Hmac<sha2::Sha256>;

/// HMAC tag size in bytes
pub const MAC_SIZE: usize = 32;

/// Compute HMAC-SHA-256 over `data` under `key`
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; MAC_SIZE], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(tag.as_slice());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 4231 test case 1
    #[test]
    fn known_answer() {
        let key = [0x0Bu8; 20];
        let expected: [u8; 32] = [
            0xb0, 0x34, 0x4c, 0x61, 0xd8, 0xdb, 0x38, 0x53, 0x5c, 0xa8, 0xaf, 0xce, 0xaf,
            0x0b, 0xf1, 0x2b, 0x88, 0x1d, 0xc2, 0x00, 0xc9, 0x83, 0x3d, 0xa7, 0x26, 0xe9,
            0x37, 0x6c, 0x2e, 0x32, 0xcf, 0xf7,
        ];
        assert_eq!(hmac_sha256(&key, b"Hi There").unwrap(), expected);
    }

    #[test]
    fn key_matters() {
        let a = hmac_sha256(&[1u8; 32], b"payload").unwrap();
        let b = hmac_sha256(&[2u8; 32], b"payload").unwrap();
        assert_ne!(a, b);
    }
}
