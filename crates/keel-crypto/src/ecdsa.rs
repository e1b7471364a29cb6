// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! ECDSA over P-256
//!
//! Key material never leaves this module undecorated: keypairs wrap the
//! underlying signing key (which zeroizes its scalar on drop) and the
//! facade deals in fixed 64-byte `r ‖ s` signatures.
//!
//! # Derivation
//!
//! [`derive_keypair`] is deterministic: the seed is hashed together
//! with a retry counter until the result lands in the scalar field, so
//! identical seeds always yield byte-identical keypairs. This is the
//! primitive both DeviceID (seeded by `cdi_prime`) and AliasID (seeded
//! by the layer measurement) are built on.

use p256::ecdsa::signature::{RandomizedSigner, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

pub use keel_common::constants::SIGNATURE_SIZE;

use crate::error::CryptoError;
use crate::hash;
use crate::rng::{CryptoRng, RngBridge};

/// Raw ECDSA signature: `r ‖ s`, 32 bytes each, big-endian
pub type EccSignature = [u8; SIGNATURE_SIZE];

/// Uncompressed SEC1 point size in bytes
pub const SEC1_POINT_SIZE: usize = 65;

/// An ECC P-256 keypair
#[derive(Debug)]
pub struct EccKeypair {
    signing: SigningKey,
}

impl EccKeypair {
    /// The public half of this keypair
    #[must_use]
    pub fn public(&self) -> EccPublicKey {
        EccPublicKey {
            verifying: *self.signing.verifying_key(),
        }
    }

    pub(crate) fn from_signing(signing: SigningKey) -> Self {
        Self { signing }
    }

    pub(crate) fn signing(&self) -> &SigningKey {
        &self.signing
    }

    /// The private scalar, big-endian
    pub(crate) fn scalar_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(self.signing.to_bytes().as_slice());
        out
    }
}

/// An ECC P-256 public key
#[derive(Clone, Debug)]
pub struct EccPublicKey {
    verifying: VerifyingKey,
}

impl EccPublicKey {
    /// The uncompressed SEC1 encoding of the point
    #[must_use]
    pub fn sec1_uncompressed(&self) -> [u8; SEC1_POINT_SIZE] {
        let point = self.verifying.to_encoded_point(false);
        let mut out = [0u8; SEC1_POINT_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    pub(crate) fn from_verifying(verifying: VerifyingKey) -> Self {
        Self { verifying }
    }
}

impl PartialEq for EccPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.sec1_uncompressed() == other.sec1_uncompressed()
    }
}

impl Eq for EccPublicKey {}

/// Deterministically derive a keypair from a seed
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` for an empty seed or in the
/// (cryptographically unreachable) case that no retry lands in the
/// scalar field.
pub fn derive_keypair(seed: &[u8]) -> Result<EccKeypair, CryptoError> {
    if seed.is_empty() {
        return Err(CryptoError::KeyDerivation);
    }
    for counter in 0u8..16 {
        let candidate = Zeroizing::new(hash::sha256_two_parts(seed, &[counter]));
        if let Ok(signing) = SigningKey::from_slice(candidate.as_slice()) {
            return Ok(EccKeypair::from_signing(signing));
        }
    }
    Err(CryptoError::KeyDerivation)
}

/// Sign `data`: SHA-256 then ECDSA with an RNG-drawn nonce
///
/// # Errors
///
/// Returns `CryptoError::RngFailure` if the entropy source failed
/// during signing, `CryptoError::Signing` otherwise.
pub fn sign<R: CryptoRng>(
    keypair: &EccKeypair,
    data: &[u8],
    rng: &mut R,
) -> Result<EccSignature, CryptoError> {
    let mut bridge = RngBridge::new(rng);
    let signature: Signature = keypair
        .signing()
        .try_sign_with_rng(&mut bridge, data)
        .map_err(|_| CryptoError::Signing)?;
    if bridge.failed {
        return Err(CryptoError::RngFailure);
    }
    let mut out = [0u8; SIGNATURE_SIZE];
    out.copy_from_slice(signature.to_bytes().as_slice());
    Ok(out)
}

/// Verify a signature: SHA-256 then ECDSA
///
/// # Errors
///
/// Any failure — malformed signature bytes included — is
/// `CryptoError::BadSignature`. Callers never learn sub-reasons.
pub fn verify(public: &EccPublicKey, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;
    public
        .verifying
        .verify(data, &signature)
        .map_err(|_| CryptoError::BadSignature)
}
