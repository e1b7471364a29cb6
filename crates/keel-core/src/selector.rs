// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Boot mode selector
//!
//! The top-level decision procedure, run to completion exactly once
//! between the pre-boot stage and the next layer:
//!
//! 1. Validate the boot parameters and derive the DeviceID.
//! 2. Housekeeping: on initial boot erase the data store and staging
//!    area, persist `static_symm` and seed the image metadata; on later
//!    boots wipe `static_symm`.
//! 3. Issue a fresh DeviceID CSR when the identity changed.
//! 4. Block for provisioning until the trust anchors and all four layer
//!    headers are in place.
//! 5. Scan staging, apply verified standard updates, and choose the
//!    boot mode: a verified core update forces the core patcher, a
//!    valid boot ticket permits the app, anything else boots the
//!    update downloader.
//! 6. Verify the chosen layer. A failing app is demoted to the
//!    downloader with `firmware_update_necessary`; a failing downloader
//!    or core patcher is fatal.
//! 7. Derive the AliasID from the verified measurement, build the cert
//!    store and the next-layer parameters, arm the watchdog, zeroize,
//!    and hand off.
//!
//! Fatal conditions surface as `Err`; the platform halts on them (the
//! armed watchdog, if any, will eventually reset the device into the
//! pre-boot stage). On every exit path the shared parameter window ends
//! up without input secrets.

use zeroize::{Zeroize, Zeroizing};

use keel_common::constants::{DEFAULT_WATCHDOG_TIMEOUT_S, KEEL_MAGIC, NONCE_SIZE};
use keel_common::log::LogBuffer;
use keel_common::{log_debug, log_error, log_info, log_warn};
use keel_common::{BootMode, Error, MemoryLayout, Result};
use keel_crypto::hash::Sha256Digest;
use keel_crypto::{pem, CryptoError, CryptoRng, EccPublicKey};
use keel_hal::{FlashInterface, RngInterface, WatchdogInterface};

use crate::certstore::{self, ImageCertStore};
use crate::identity;
use crate::image;
use crate::params::{self, ParamsWindow};
use crate::staging::{self, ElementKind};
use crate::store::{self, ConfigData};
use crate::update;

const MODULE: &str = "selector";

/// The peripherals and fixed layout the engine runs against
pub struct CoreEnv<F, R, W> {
    /// Flash device
    pub flash: F,
    /// Platform RNG; deinitialized before handoff
    pub rng: R,
    /// Authenticated watchdog timer
    pub watchdog: W,
    /// The fixed flash map
    pub layout: MemoryLayout,
    /// Trace sink
    pub log: LogBuffer,
}

/// The outcome of a completed core run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    /// Hand off to the chosen layer; the watchdog is armed
    Launch {
        /// The layer to launch
        mode: BootMode,
        /// The armed watchdog deferral
        watchdog_timeout_s: u32,
    },
    /// The device is not provisioned; the platform blocks indefinitely
    /// and waits for the management service
    AwaitProvisioning,
}

/// Bridge from the HAL RNG to the crypto facade
struct CoreRng<'a, R: RngInterface>(&'a mut R);

impl<R: RngInterface> CryptoRng for CoreRng<'_, R> {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), CryptoError> {
        self.0.fill_bytes(dest).map_err(|_| CryptoError::RngFailure)
    }
}

/// Run the boot-decision engine
///
/// `window` is the RAM window shared with the pre-boot stage and the
/// next layer; `cert_store` is the next layer's certificate store
/// window. On `Err` the window has been zeroized and the platform must
/// halt.
pub fn run<F, R, W>(
    env: &mut CoreEnv<F, R, W>,
    window: &mut ParamsWindow<'_>,
    cert_store: &mut ImageCertStore,
) -> Result<BootDecision>
where
    F: FlashInterface,
    R: RngInterface,
    W: WatchdogInterface,
{
    let decision = run_inner(env, window, cert_store);
    if decision.is_err() {
        window.zeroize();
    }
    decision
}

fn run_inner<F, R, W>(
    env: &mut CoreEnv<F, R, W>,
    window: &mut ParamsWindow<'_>,
    cert_store: &mut ImageCertStore,
) -> Result<BootDecision>
where
    F: FlashInterface,
    R: RngInterface,
    W: WatchdogInterface,
{
    let boot = Zeroizing::new(window.read_boot_params()?);
    let layout = env.layout;

    let device_id = identity::derive_device_id(&boot)?;
    log_info!(env.log, MODULE, "derived DeviceID");

    if boot.initial_boot() {
        log_info!(env.log, MODULE, "initial boot: erasing data store and staging area");
        store::erase_data_store(&mut env.flash, &layout)?;
        env.flash.erase(layout.staging_base, layout.staging_size)?;
        store::store_static_symm(&mut env.flash, &layout, &boot.static_symm, &boot.dev_uuid)?;
        update::refresh_image_metadata(&mut env.flash, &layout)?;
    } else if store::wipe_static_symm(&mut env.flash, &layout)? {
        log_info!(env.log, MODULE, "wiped static_symm");
    } else {
        log_debug!(env.log, MODULE, "static_symm already wiped");
    }

    let anchors = store::read_trust_anchors(&env.flash, &layout)?;
    let core_updated = identity::is_core_updated(&device_id, &anchors);
    if core_updated {
        log_info!(env.log, MODULE, "new DeviceID: issuing certificate signing request");
        let provisioned = store::provisioning_complete(&env.flash, &layout)?;
        let mut rng = CoreRng(&mut env.rng);
        certstore::create_device_id_csr(
            &mut env.flash,
            &layout,
            &device_id,
            boot.initial_boot(),
            provisioned,
            &mut rng,
        )?;
    }

    if !store::provisioning_complete(&env.flash, &layout)? {
        log_warn!(env.log, MODULE, "device not provisioned: blocking for provisioning");
        window.zeroize();
        return Ok(BootDecision::AwaitProvisioning);
    }

    // Fresh read: the CSR path may have rewritten the record
    let anchors = store::read_trust_anchors(&env.flash, &layout)?;
    let management = pem::public_key_from_pem(&anchors.info.management_pub_key)
        .map_err(|_| Error::NotProvisioned)?;
    let code_authority = pem::public_key_from_pem(&anchors.info.code_auth_pub_key)
        .map_err(|_| Error::NotProvisioned)?;

    let cur_nonce = boot.cur_nonce;

    let mut mode = if staging::count_elements(&env.flash, &layout)? == 0 {
        log_info!(env.log, MODULE, "staging area empty");
        BootMode::Downloader
    } else {
        if update::standard_updates_pending(&env.flash, &layout, &cur_nonce, &management)? {
            update::apply_updates(&mut env.flash, &layout, &cur_nonce, &management, &mut env.log)?;
        }
        update::refresh_image_metadata(&mut env.flash, &layout)?;

        if verified_present(
            &env.flash,
            &layout,
            &mut env.log,
            ElementKind::CoreUpdate,
            &cur_nonce,
            &management,
        )? {
            BootMode::CorePatcher
        } else if verified_present(
            &env.flash,
            &layout,
            &mut env.log,
            ElementKind::BootTicket,
            &cur_nonce,
            &management,
        )? {
            BootMode::App
        } else {
            BootMode::Downloader
        }
    };
    log_info!(env.log, MODULE, "boot mode: {}", mode);

    let deferral = match staging::deferral_time(&env.flash, &layout, &cur_nonce, &management) {
        Ok(Some(seconds)) => seconds,
        Ok(None) => {
            log_warn!(
                env.log,
                MODULE,
                "no valid deferral ticket, defaulting to {}s",
                DEFAULT_WATCHDOG_TIMEOUT_S
            );
            DEFAULT_WATCHDOG_TIMEOUT_S
        }
        Err(Error::FlashError) => return Err(Error::FlashError),
        Err(e) => {
            log_warn!(
                env.log,
                MODULE,
                "invalid deferral ticket ({}), defaulting to {}s",
                e,
                DEFAULT_WATCHDOG_TIMEOUT_S
            );
            DEFAULT_WATCHDOG_TIMEOUT_S
        }
    };

    let config = store::read_config(&env.flash, &layout)?;

    // Trusted boot of the next layer. An unverifiable app is
    // recoverable; an unverifiable downloader or core patcher is not.
    let mut firmware_update_necessary = false;
    let digest = match verify_layer(&env.flash, &layout, mode, &config, &code_authority) {
        Ok(digest) => digest,
        Err(e) if mode == BootMode::App => {
            log_warn!(
                env.log,
                MODULE,
                "app verification failed ({}), booting downloader for new firmware",
                e
            );
            mode = BootMode::Downloader;
            firmware_update_necessary = true;
            verify_layer(&env.flash, &layout, mode, &config, &code_authority)?
        }
        Err(e) => {
            log_error!(env.log, MODULE, "{} verification failed: {}", mode, e);
            return Err(e);
        }
    };

    let alias_id = identity::derive_alias_id(&digest, &device_id)?;
    let alias_pub_pem = pem::public_key_to_pem(&alias_id.public())?;
    let alias_priv_pem = pem::private_key_to_pem(&alias_id)?;
    log_info!(env.log, MODULE, "derived AliasID for {}", mode);

    let mut dev_auth = match mode {
        BootMode::Downloader | BootMode::CorePatcher => Some(identity::derive_dev_auth(
            &device_id,
            &boot.core_auth,
            &boot.dev_uuid,
        )?),
        BootMode::App => None,
    };

    {
        let mut rng = CoreRng(&mut env.rng);
        certstore::build_cert_store(&anchors, &device_id, &alias_id, &mut rng, cert_store)?;
    }

    let nw_info = (config.nw_info.magic == KEEL_MAGIC).then_some(&config.nw_info);
    let mut next = params::build_next_layer_params(
        mode,
        &boot,
        &alias_pub_pem,
        &alias_priv_pem,
        dev_auth.as_ref(),
        core_updated,
        firmware_update_necessary,
        nw_info,
    );
    window.install(&next);
    next.zeroize();
    if let Some(tag) = dev_auth.as_mut() {
        tag.zeroize();
    }

    env.watchdog.init(deferral)?;
    if env.watchdog.was_watchdog_reset() {
        log_warn!(env.log, MODULE, "last reset was forced by the watchdog");
    }

    env.rng.deinit();
    log_info!(env.log, MODULE, "handing off to {}", mode);

    Ok(BootDecision::Launch {
        mode,
        watchdog_timeout_s: deferral,
    })
}

/// Verify the image the given mode would boot, returning its measurement
fn verify_layer<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    mode: BootMode,
    config: &ConfigData,
    code_authority: &EccPublicKey,
) -> Result<Sha256Digest> {
    let kind = mode.image_kind();
    let meta = config.img_info.meta(kind).ok_or(Error::InternalError)?;
    image::verify_image(flash, layout, kind, meta, code_authority)
}

/// Whether a fully verified element of `kind` is staged
///
/// Elements that are present but fail verification are logged and
/// treated as absent; only flash faults propagate.
fn verified_present<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    log: &mut LogBuffer,
    kind: ElementKind,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
) -> Result<bool> {
    match staging::find_verified(flash, layout, kind, cur_nonce, management) {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Ok(false),
        Err(Error::FlashError) => Err(Error::FlashError),
        Err(e) => {
            log_warn!(log, MODULE, "ignoring invalid {} element: {}", kind.as_str(), e);
            Ok(false)
        }
    }
}
