// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Identity derivation
//!
//! The layered identity chain:
//!
//! - **DeviceID** is derived from `cdi_prime`, the compound device
//!   secret the pre-boot stage computes. Same secret, same keypair —
//!   the DeviceID survives reboots and changes only when the core (and
//!   with it the derivation chain below it) changes.
//! - **AliasID** is re-derived every boot from the measurement of the
//!   next layer and the DeviceID private key, so it attests to *this
//!   device running this specific code*.
//! - **`dev_auth`** binds the DeviceID public key to the device UUID
//!   under the core authentication key; only layers that may carry out
//!   re-association receive it.
//!
//! Seeds, private-key PEM and concatenation buffers are all zeroized on
//! every exit path.

use zeroize::Zeroizing;

use keel_common::constants::{AUTH_KEY_SIZE, DEV_AUTH_SIZE, PEM_BUF_SIZE, UUID_SIZE};
use keel_common::Result;
use keel_crypto::hash::sha256_two_parts;
use keel_crypto::{ecdsa, mac, pem, EccKeypair};

use crate::params::BootParams;
use crate::store::TrustAnchors;

/// Derive the DeviceID keypair from the boot parameters
pub fn derive_device_id(boot: &BootParams) -> Result<EccKeypair> {
    Ok(ecdsa::derive_keypair(&boot.cdi_prime)?)
}

/// Derive the volatile AliasID keypair
///
/// Seed is `SHA-256(code_digest ‖ deviceid_priv_pem)` over the full
/// fixed-size private-key PEM buffer, so the AliasID changes iff the
/// booted image or the DeviceID changes.
pub fn derive_alias_id(code_digest: &[u8; 32], device_id: &EccKeypair) -> Result<EccKeypair> {
    let priv_pem = pem::private_key_to_pem(device_id)?;
    let seed = Zeroizing::new(sha256_two_parts(code_digest, priv_pem.as_slice()));
    Ok(ecdsa::derive_keypair(seed.as_slice())?)
}

/// Derive `dev_auth`: `HMAC-SHA-256(core_auth, deviceid_pub_pem ‖ dev_uuid)`
///
/// The MAC runs over the full fixed-size public-key PEM buffer followed
/// by the UUID.
pub fn derive_dev_auth(
    device_id: &EccKeypair,
    core_auth: &[u8; AUTH_KEY_SIZE],
    dev_uuid: &[u8; UUID_SIZE],
) -> Result<[u8; DEV_AUTH_SIZE]> {
    let pub_pem = pem::public_key_to_pem(&device_id.public())?;
    let mut message = Zeroizing::new([0u8; PEM_BUF_SIZE + UUID_SIZE]);
    message[..PEM_BUF_SIZE].copy_from_slice(&pub_pem);
    message[PEM_BUF_SIZE..].copy_from_slice(dev_uuid);
    Ok(mac::hmac_sha256(core_auth, message.as_slice())?)
}

/// Check whether the derived DeviceID differs from the stored identity
///
/// A stored key that does not decode — erased flash after initial boot,
/// or a corrupted record — counts as changed: either way a fresh CSR
/// must be issued.
#[must_use]
pub fn is_core_updated(device_id: &EccKeypair, anchors: &TrustAnchors) -> bool {
    match pem::public_key_from_pem(&anchors.info.dev_pub_key) {
        Ok(stored) => stored != device_id.public(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::constants::CDI_SIZE;

    fn boot_with_cdi(cdi: [u8; CDI_SIZE]) -> BootParams {
        let mut boot = BootParams::zeroed();
        boot.cdi_prime = cdi;
        boot
    }

    #[test]
    fn device_id_is_stable_for_a_stable_seed() {
        let a = derive_device_id(&boot_with_cdi([0x22; CDI_SIZE])).unwrap();
        let b = derive_device_id(&boot_with_cdi([0x22; CDI_SIZE])).unwrap();
        assert_eq!(a.public(), b.public());
    }

    #[test]
    fn alias_id_changes_with_digest_and_with_device_id() {
        let device_a = derive_device_id(&boot_with_cdi([0x22; CDI_SIZE])).unwrap();
        let device_b = derive_device_id(&boot_with_cdi([0x23; CDI_SIZE])).unwrap();

        let alias_1 = derive_alias_id(&[0xAA; 32], &device_a).unwrap();
        let alias_same = derive_alias_id(&[0xAA; 32], &device_a).unwrap();
        let alias_other_code = derive_alias_id(&[0xAB; 32], &device_a).unwrap();
        let alias_other_device = derive_alias_id(&[0xAA; 32], &device_b).unwrap();

        assert_eq!(alias_1.public(), alias_same.public());
        assert_ne!(alias_1.public(), alias_other_code.public());
        assert_ne!(alias_1.public(), alias_other_device.public());
    }

    #[test]
    fn dev_auth_depends_on_every_input() {
        let device = derive_device_id(&boot_with_cdi([0x22; CDI_SIZE])).unwrap();
        let other = derive_device_id(&boot_with_cdi([0x23; CDI_SIZE])).unwrap();

        let base = derive_dev_auth(&device, &[1; AUTH_KEY_SIZE], &[2; UUID_SIZE]).unwrap();
        assert_eq!(
            base,
            derive_dev_auth(&device, &[1; AUTH_KEY_SIZE], &[2; UUID_SIZE]).unwrap()
        );
        assert_ne!(
            base,
            derive_dev_auth(&device, &[9; AUTH_KEY_SIZE], &[2; UUID_SIZE]).unwrap()
        );
        assert_ne!(
            base,
            derive_dev_auth(&device, &[1; AUTH_KEY_SIZE], &[9; UUID_SIZE]).unwrap()
        );
        assert_ne!(
            base,
            derive_dev_auth(&other, &[1; AUTH_KEY_SIZE], &[2; UUID_SIZE]).unwrap()
        );
    }

    #[test]
    fn identity_change_detection() {
        let device = derive_device_id(&boot_with_cdi([0x22; CDI_SIZE])).unwrap();

        // Erased anchors: no decodable key, counts as changed
        let mut anchors = TrustAnchors::first_boot();
        assert!(is_core_updated(&device, &anchors));

        // Matching stored key: unchanged
        anchors.info.dev_pub_key = pem::public_key_to_pem(&device.public()).unwrap();
        assert!(!is_core_updated(&device, &anchors));

        // A different stored key: changed
        let other = derive_device_id(&boot_with_cdi([0x23; CDI_SIZE])).unwrap();
        anchors.info.dev_pub_key = pem::public_key_to_pem(&other.public()).unwrap();
        assert!(is_core_updated(&device, &anchors));
    }
}
