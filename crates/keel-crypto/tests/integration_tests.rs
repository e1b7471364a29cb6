// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Integration tests for keel-crypto
//!
//! Facade-level properties: identity determinism across the whole
//! derive → PEM → derive path, signature round-trips under bit flips,
//! and the interplay of streaming and one-shot hashing used by the
//! flash verifiers.

use keel_crypto::ecdsa::{self, derive_keypair};
use keel_crypto::hash;
use keel_crypto::mac::hmac_sha256;
use keel_crypto::pem;
use keel_crypto::x509::{self, Name};
use keel_crypto::{CryptoError, CryptoRng};

struct TestRng(u64);

impl CryptoRng for TestRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), CryptoError> {
        for byte in dest.iter_mut() {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
            *byte = (self.0 >> 33) as u8;
        }
        Ok(())
    }
}

mod identity_determinism {
    use super::*;

    #[test]
    fn same_seed_same_keypair_across_runs() {
        let seed = [0x22u8; 32];
        let a = derive_keypair(&seed).unwrap();
        let b = derive_keypair(&seed).unwrap();

        assert_eq!(
            pem::public_key_to_pem(&a.public()).unwrap(),
            pem::public_key_to_pem(&b.public()).unwrap()
        );
        assert_eq!(
            *pem::private_key_to_pem(&a).unwrap(),
            *pem::private_key_to_pem(&b).unwrap()
        );
    }

    #[test]
    fn one_bit_of_seed_changes_the_key() {
        let mut seed = [0x22u8; 32];
        let a = derive_keypair(&seed).unwrap();
        seed[31] ^= 0x01;
        let b = derive_keypair(&seed).unwrap();
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn pem_roundtrip_preserves_signing_ability() {
        let keypair = derive_keypair(b"roundtrip seed").unwrap();
        let priv_pem = pem::private_key_to_pem(&keypair).unwrap();
        let restored = pem::private_key_from_pem(priv_pem.as_slice()).unwrap();

        let sig = ecdsa::sign(&restored, b"data", &mut TestRng(9)).unwrap();
        assert!(ecdsa::verify(&keypair.public(), b"data", &sig).is_ok());
    }
}

mod signature_roundtrip {
    use super::*;

    #[test]
    fn verify_accepts_then_rejects_every_flipped_signature_byte() {
        let keypair = derive_keypair(b"flip seed").unwrap();
        let data = b"the signed header content";
        let sig = ecdsa::sign(&keypair, data, &mut TestRng(1)).unwrap();

        assert!(ecdsa::verify(&keypair.public(), data, &sig).is_ok());

        for i in 0..sig.len() {
            let mut bad = sig;
            bad[i] ^= 0x80;
            assert!(
                ecdsa::verify(&keypair.public(), data, &bad).is_err(),
                "flipped byte {i} still verified"
            );
        }
    }

    #[test]
    fn randomized_signatures_differ_but_both_verify() {
        let keypair = derive_keypair(b"nonce seed").unwrap();
        let a = ecdsa::sign(&keypair, b"data", &mut TestRng(1)).unwrap();
        let b = ecdsa::sign(&keypair, b"data", &mut TestRng(2)).unwrap();
        assert_ne!(a, b);
        assert!(ecdsa::verify(&keypair.public(), b"data", &a).is_ok());
        assert!(ecdsa::verify(&keypair.public(), b"data", &b).is_ok());
    }

    #[test]
    fn wrong_key_rejects() {
        let signer = derive_keypair(b"signer").unwrap();
        let other = derive_keypair(b"other").unwrap();
        let sig = ecdsa::sign(&signer, b"data", &mut TestRng(3)).unwrap();
        assert!(ecdsa::verify(&other.public(), b"data", &sig).is_err());
    }
}

mod hashing {
    use super::*;

    #[test]
    fn streaming_equals_one_shot_for_any_chunking() {
        let mut data = [0u8; 1337];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let expected = hash::sha256(&data);

        for chunk_size in [1, 13, 64, 256, 512, 1337] {
            let mut hasher = hash::Sha256::new();
            for chunk in data.chunks(chunk_size) {
                hasher.update(chunk);
            }
            assert_eq!(hasher.finalize(), expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn dev_auth_binds_both_key_and_uuid() {
        let key = [7u8; 32];
        let a = hmac_sha256(&key, b"pubkey-pem|uuid-a").unwrap();
        let b = hmac_sha256(&key, b"pubkey-pem|uuid-b").unwrap();
        let c = hmac_sha256(&[8u8; 32], b"pubkey-pem|uuid-a").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}

mod issuance {
    use super::*;

    const DEVICE_ID_NAME: Name = Name {
        common_name: "DeviceID",
        org: "Keelboot",
        country: "DE",
    };
    const ALIAS_ID_NAME: Name = Name {
        common_name: "AliasID",
        org: "Keelboot",
        country: "DE",
    };

    #[test]
    fn csr_and_cert_fit_their_bags() {
        let device_id = derive_keypair(b"device id seed").unwrap();
        let alias_id = derive_keypair(b"alias id seed").unwrap();
        let mut rng = TestRng(5);

        let mut csr = [0u8; 2288];
        let csr_len = x509::write_csr_pem(&DEVICE_ID_NAME, &device_id, &mut rng, &mut csr).unwrap();
        assert!(csr_len > 0 && csr_len < 1024);

        let mut cert = [0u8; 2048];
        let cert_len = x509::write_cert_pem(
            &DEVICE_ID_NAME,
            &ALIAS_ID_NAME,
            &alias_id.public(),
            &device_id,
            &mut rng,
            &mut cert,
        )
        .unwrap();
        assert!(cert_len > 0 && cert_len < 1024);
        assert!(cert[..cert_len].starts_with(b"-----BEGIN CERTIFICATE-----"));
    }
}
