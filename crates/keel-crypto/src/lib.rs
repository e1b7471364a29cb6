// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Keelboot Crypto Facade
//!
//! The narrow cryptographic interface the boot path is allowed to use:
//! SHA-256 hashing, HMAC-SHA-256, ECDSA over P-256 with deterministic
//! keypair derivation from a seed, fixed-buffer PEM coding and a
//! minimal X.509 emitter for the DeviceID CSR and the AliasID
//! certificate.
//!
//! # Design
//!
//! - Every signature in the system binds SHA-256 of the signed bytes;
//!   verification failure is a single `BadSignature` kind and callers
//!   never learn sub-reasons.
//! - Signing draws its nonce from the platform RNG through the
//!   [`rng::CryptoRng`] trait.
//! - All buffers are fixed-size; nothing here allocates.
//!
//! # Security
//!
//! Secret material (scalars, seeds, private-key PEM) is held in
//! [`zeroize::Zeroizing`] wrappers or zeroized explicitly on every exit
//! path.

#![no_std]
#![warn(missing_docs)]

pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod mac;
pub mod pem;
pub mod rng;
pub mod x509;
pub mod zeroize_utils;

pub use ecdsa::{EccKeypair, EccPublicKey};
pub use error::CryptoError;
pub use rng::CryptoRng;
pub use zeroize_utils::{constant_time_eq, is_zero, secure_zero};
