// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Boot parameter windows
//!
//! One fixed RAM window is shared temporally between three owners: the
//! pre-boot stage writes [`BootParams`] into it, the core consumes them,
//! and before handoff the core rewrites the window with
//! [`NextLayerParams`] for the layer it launches. Because the input and
//! output structures overlap, the output is always built in a stack
//! copy, the window zeroized, and only then installed — that ordering
//! is enforced by [`ParamsWindow::install`].
//!
//! # Need to know
//!
//! The output is populated per boot mode. The application never learns
//! `cur_nonce`, `dev_auth` or network credentials, so it can neither
//! impersonate the device to the management service nor trigger a
//! re-association.

use core::ptr;

use zeroize::Zeroize;

use keel_common::constants::{
    AUTH_KEY_SIZE, BOOT_PARAMS_SIZE, CDI_SIZE, DEV_AUTH_SIZE, KEEL_MAGIC,
    NEXT_LAYER_PARAMS_SIZE, NONCE_SIZE, PARAMS_WINDOW_SIZE, SYMM_KEY_SIZE, UUID_SIZE,
};
use keel_common::{BootMode, Error, PemBuf, Result};
use keel_crypto::secure_zero;

use crate::store::NetworkInfo;

/// Boot parameters handed over by the pre-boot stage
///
/// Valid iff `magic` matches. Read once; the window is zeroized before
/// handoff so none of these secrets outlive the core.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct BootParams {
    /// `KEEL_MAGIC` when the pre-boot stage filled the window
    pub magic: u32,
    /// Reserved
    pub reserved: [u8; 4],
    /// Secret seed for DeviceID derivation
    pub cdi_prime: [u8; CDI_SIZE],
    /// Device UUID
    pub dev_uuid: [u8; UUID_SIZE],
    /// HMAC key for `dev_auth` derivation
    pub core_auth: [u8; AUTH_KEY_SIZE],
    /// Nonce of the current boot epoch
    pub cur_nonce: [u8; NONCE_SIZE],
    /// Nonce of the next boot epoch
    pub next_nonce: [u8; NONCE_SIZE],
    /// One-time provisioning secret; present only at initial boot
    pub static_symm: [u8; SYMM_KEY_SIZE],
    /// Nonzero at the very first boot of the device
    pub initial_boot: u8,
    /// Padding
    pub pad: [u8; 7],
}

impl BootParams {
    /// An all-zero structure, for staged construction
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            magic: 0,
            reserved: [0; 4],
            cdi_prime: [0; CDI_SIZE],
            dev_uuid: [0; UUID_SIZE],
            core_auth: [0; AUTH_KEY_SIZE],
            cur_nonce: [0; NONCE_SIZE],
            next_nonce: [0; NONCE_SIZE],
            static_symm: [0; SYMM_KEY_SIZE],
            initial_boot: 0,
            pad: [0; 7],
        }
    }

    /// Whether this is the very first boot of the device
    #[must_use]
    pub fn initial_boot(&self) -> bool {
        self.initial_boot != 0
    }
}

impl Zeroize for BootParams {
    fn zeroize(&mut self) {
        self.magic = 0;
        self.reserved.zeroize();
        self.cdi_prime.zeroize();
        self.dev_uuid.zeroize();
        self.core_auth.zeroize();
        self.cur_nonce.zeroize();
        self.next_nonce.zeroize();
        self.static_symm.zeroize();
        self.initial_boot = 0;
        self.pad.zeroize();
    }
}

/// Boot parameters the core hands to the next layer
#[repr(C)]
#[derive(Clone)]
pub struct NextLayerParams {
    /// `KEEL_MAGIC` once the structure is complete
    pub magic: u32,
    /// Reserved
    pub reserved: [u8; 4],
    /// AliasID public key PEM
    pub alias_pub_pem: PemBuf,
    /// AliasID private key PEM
    pub alias_priv_pem: PemBuf,
    /// Device UUID
    pub dev_uuid: [u8; UUID_SIZE],
    /// Current boot nonce (downloader and core patcher only)
    pub cur_nonce: [u8; NONCE_SIZE],
    /// Next boot nonce (app and downloader only)
    pub next_nonce: [u8; NONCE_SIZE],
    /// `dev_auth` tag (downloader and core patcher only)
    pub dev_auth: [u8; DEV_AUTH_SIZE],
    /// Nonzero when the DeviceID changed this boot and re-association
    /// must be carried out
    pub dev_reassociation_necessary: u8,
    /// Nonzero when the application could not be verified and new
    /// firmware must be fetched
    pub firmware_update_necessary: u8,
    /// Padding
    pub pad: [u8; 6],
    /// Network credentials (downloader only, when provisioned)
    pub nw_data: NetworkInfo,
}

impl NextLayerParams {
    /// An all-zero structure
    #[must_use]
    pub fn zeroed() -> Self {
        crate::regions::filled(0)
    }
}

// SAFETY: repr(C), integers and byte arrays only, no implicit padding
// (layouts asserted below).
unsafe impl crate::regions::Record for NextLayerParams {}

impl Zeroize for NextLayerParams {
    fn zeroize(&mut self) {
        self.magic = 0;
        self.reserved.zeroize();
        self.alias_pub_pem.zeroize();
        self.alias_priv_pem.zeroize();
        self.dev_uuid.zeroize();
        self.cur_nonce.zeroize();
        self.next_nonce.zeroize();
        self.dev_auth.zeroize();
        self.dev_reassociation_necessary = 0;
        self.firmware_update_necessary = 0;
        self.pad.zeroize();
        self.nw_data.magic = 0;
        self.nw_data.ssid.zeroize();
        self.nw_data.psk.zeroize();
        self.nw_data.reserved.zeroize();
    }
}

const _: () = assert!(core::mem::size_of::<BootParams>() == BOOT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<NextLayerParams>() == NEXT_LAYER_PARAMS_SIZE);
const _: () = assert!(BOOT_PARAMS_SIZE <= PARAMS_WINDOW_SIZE);
const _: () = assert!(NEXT_LAYER_PARAMS_SIZE <= PARAMS_WINDOW_SIZE);

/// Checked, exclusive view over the shared boot-parameter RAM window
pub struct ParamsWindow<'a> {
    bytes: &'a mut [u8],
}

impl<'a> ParamsWindow<'a> {
    /// Wrap the window memory
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the slice is smaller than the window.
    pub fn new(bytes: &'a mut [u8]) -> Result<Self> {
        if bytes.len() < PARAMS_WINDOW_SIZE {
            return Err(Error::InvalidInput);
        }
        Ok(Self { bytes })
    }

    /// Read the input boot parameters out of the window
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the magic does not match.
    pub fn read_boot_params(&self) -> Result<BootParams> {
        // SAFETY: the window is at least PARAMS_WINDOW_SIZE >=
        // size_of::<BootParams>() bytes; read_unaligned tolerates the
        // byte-slice alignment and copies the value out.
        let params: BootParams =
            unsafe { ptr::read_unaligned(self.bytes.as_ptr().cast::<BootParams>()) };
        if params.magic != KEEL_MAGIC {
            return Err(Error::InvalidInput);
        }
        Ok(params)
    }

    /// Write input boot parameters into the window
    ///
    /// This is the pre-boot stage's side of the contract; the engine
    /// itself only reads. Kept here so host tests and stage simulators
    /// share one layout definition.
    pub fn write_boot_params(&mut self, params: &BootParams) {
        self.zeroize();
        // SAFETY: window length checked in `new`; write_unaligned
        // tolerates the byte-slice alignment.
        unsafe {
            ptr::write_unaligned(self.bytes.as_mut_ptr().cast::<BootParams>(), params.clone());
        }
    }

    /// Zeroize the whole window
    pub fn zeroize(&mut self) {
        secure_zero(self.bytes);
    }

    /// Install the next-layer parameters
    ///
    /// Zeroizes the window first: the input and output structures
    /// overlap, and the input secrets must be gone before the output
    /// appears.
    pub fn install(&mut self, params: &NextLayerParams) {
        self.zeroize();
        // SAFETY: window length checked in `new`; write_unaligned
        // tolerates the byte-slice alignment.
        unsafe {
            ptr::write_unaligned(
                self.bytes.as_mut_ptr().cast::<NextLayerParams>(),
                params.clone(),
            );
        }
    }

    /// Read the installed next-layer parameters back
    ///
    /// The next layer's side of the contract; also used by the tests.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no complete structure is installed.
    pub fn read_next_layer(&self) -> Result<NextLayerParams> {
        // SAFETY: as in `read_boot_params`.
        let params: NextLayerParams =
            unsafe { ptr::read_unaligned(self.bytes.as_ptr().cast::<NextLayerParams>()) };
        if params.magic != KEEL_MAGIC {
            return Err(Error::InvalidInput);
        }
        Ok(params)
    }

    /// The raw window bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// Build the next-layer parameter structure for `mode`
///
/// Population follows the need-to-know table: every mode receives the
/// AliasID keypair and the device UUID; nonces, `dev_auth`, the status
/// flags and network credentials are mode-dependent.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_next_layer_params(
    mode: BootMode,
    boot: &BootParams,
    alias_pub_pem: &PemBuf,
    alias_priv_pem: &PemBuf,
    dev_auth: Option<&[u8; DEV_AUTH_SIZE]>,
    dev_reassociation_necessary: bool,
    firmware_update_necessary: bool,
    nw_info: Option<&NetworkInfo>,
) -> NextLayerParams {
    let mut params = NextLayerParams::zeroed();

    params.alias_pub_pem = *alias_pub_pem;
    params.alias_priv_pem = *alias_priv_pem;
    params.dev_uuid = boot.dev_uuid;

    if matches!(mode, BootMode::App | BootMode::Downloader) {
        params.next_nonce = boot.next_nonce;
    }

    if matches!(mode, BootMode::Downloader | BootMode::CorePatcher) {
        params.cur_nonce = boot.cur_nonce;
        if let Some(tag) = dev_auth {
            params.dev_auth = *tag;
        }
        params.dev_reassociation_necessary = u8::from(dev_reassociation_necessary);
        params.firmware_update_necessary = u8::from(firmware_update_necessary);
    }

    if mode == BootMode::Downloader {
        if let Some(nw) = nw_info {
            params.nw_data = *nw;
        }
    }

    params.magic = KEEL_MAGIC;
    params
}
