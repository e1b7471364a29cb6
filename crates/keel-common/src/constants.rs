// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! System-wide constants for the Keelboot core
//!
//! Every size here is a contract with either the pre-boot stage, the
//! next layer or the management service. Record sizes are cross-checked
//! against the concrete struct layouts with compile-time asserts in
//! `keel-core`.

// =============================================================================
// Sentinels
// =============================================================================

/// Shared 32-bit magic marking a structure as initialized: "KEEL"
pub const KEEL_MAGIC: u32 = 0x4C45_454B;

/// Byte pattern of erased flash
pub const FLASH_ERASED_BYTE: u8 = 0xFF;

/// Flash program/erase page size in bytes
pub const FLASH_PAGE_SIZE: usize = 512;

// =============================================================================
// Cryptographic Sizes
// =============================================================================

/// SHA-256 digest size in bytes
pub const DIGEST_SIZE: usize = 32;

/// ECDSA P-256 signature size in bytes (raw `r ‖ s`)
pub const SIGNATURE_SIZE: usize = 64;

/// Fixed buffer size for PEM-encoded keys and certificates
///
/// P-256 SPKI and SEC1 private-key PEMs both fit with headroom; buffers
/// are NUL-terminated and zero-padded.
pub const PEM_BUF_SIZE: usize = 256;

// =============================================================================
// Boot Parameter Sizes
// =============================================================================

/// Compound device identifier seed size in bytes
pub const CDI_SIZE: usize = 32;

/// Device UUID size in bytes (UUIDv4, binary)
pub const UUID_SIZE: usize = 16;

/// Core authentication HMAC key size in bytes
pub const AUTH_KEY_SIZE: usize = 32;

/// Boot nonce size in bytes
pub const NONCE_SIZE: usize = 32;

/// One-time symmetric provisioning secret size in bytes
pub const SYMM_KEY_SIZE: usize = 32;

/// `dev_auth` HMAC tag size in bytes
pub const DEV_AUTH_SIZE: usize = 32;

/// Image name field size in bytes
pub const IMAGE_NAME_SIZE: usize = 32;

// =============================================================================
// Record Sizes (flash / shared RAM)
// =============================================================================

/// Input boot parameter structure size in bytes
pub const BOOT_PARAMS_SIZE: usize = 192;

/// Next-layer boot parameter structure size in bytes
pub const NEXT_LAYER_PARAMS_SIZE: usize = 744;

/// Size of the RAM window shared between the boot parameter structures
pub const PARAMS_WINDOW_SIZE: usize = 1024;

/// Trust anchors record size in bytes (6 flash pages)
pub const TRUST_ANCHORS_SIZE: usize = 3072;

/// Trust anchors certificate bag size in bytes
pub const TRUST_ANCHORS_CERT_BAG_SIZE: usize = 2288;

/// Config data record size in bytes (1 flash page)
pub const CONFIG_DATA_SIZE: usize = 512;

/// Total data store size in bytes (trust anchors ‖ config data)
pub const DATA_STORE_SIZE: usize = TRUST_ANCHORS_SIZE + CONFIG_DATA_SIZE;

/// Staging element header size in bytes
pub const STAGING_HEADER_SIZE: usize = 140;

/// Image header record size in bytes (one flash page; code follows)
pub const IMAGE_HEADER_SIZE: usize = 512;

/// Image certificate store size in bytes (next-layer RAM)
pub const CERT_STORE_SIZE: usize = 4096;

/// Image certificate store bag size in bytes
pub const CERT_STORE_BAG_SIZE: usize = 3564;

// =============================================================================
// Watchdog
// =============================================================================

/// Watchdog deferral applied when no valid deferral ticket is staged
pub const DEFAULT_WATCHDOG_TIMEOUT_S: u32 = 300;
