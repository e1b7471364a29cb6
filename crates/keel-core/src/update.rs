// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Update applier
//!
//! Consumes a scanned staging area and installs verified standard
//! updates into their target regions:
//!
//! - downloader / core patcher / app updates: the payload is a full
//!   image (header + code) copied page-wise into the image region;
//! - config updates: the payload is a [`NetworkInfo`] record installed
//!   by full-config rewrite;
//! - re-association responses: the payload is the hub-issued DeviceID
//!   certificate, installed into the trust-anchors DEVICEID slot.
//!
//! Core updates are never installed here; their verified presence
//! forces the core patcher boot mode. Elements that fail verification
//! are skipped with a warning; a flash failure while installing is
//! fatal for the boot, because a half-applied update cannot be
//! tolerated. After applying, image metadata is refreshed from the
//! installed headers — versions and issue times never decrease.

use keel_common::constants::{IMAGE_HEADER_SIZE, KEEL_MAGIC, NONCE_SIZE};
use keel_common::log::LogBuffer;
use keel_common::{log_info, log_warn};
use keel_common::{Error, ImageKind, MemoryLayout, Result};
use keel_crypto::EccPublicKey;
use keel_hal::FlashInterface;

use crate::image;
use crate::regions;
use crate::staging::{self, ElementKind, StagingElement};
use crate::store::{self, CertSlot, ImageMeta, NetworkInfo, SLOT_DEVICE_ID};

const MODULE: &str = "update";

/// Check whether any standard update is staged and verifies
pub fn standard_updates_pending<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
) -> Result<bool> {
    let mut offset = 0;
    while let Some(element) = staging::element_at(flash, layout, offset)? {
        if element.kind().is_some_and(|k| k.is_standard_update())
            && staging::verify_element(flash, layout, &element, cur_nonce, management).is_ok()
        {
            return Ok(true);
        }
        match staging::next_offset(layout, &element) {
            Some(next) => offset = next,
            None => break,
        }
    }
    Ok(false)
}

/// Verify and install every standard update in staging order
///
/// Elements that fail verification are skipped; install failures abort
/// the boot.
pub fn apply_updates<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
    log: &mut LogBuffer,
) -> Result<()> {
    let mut offset = 0;
    loop {
        let Some(element) = staging::element_at(&*flash, layout, offset)? else {
            break;
        };
        let advance = staging::next_offset(layout, &element);

        if let Some(kind) = element.kind() {
            if kind.is_standard_update() {
                match staging::verify_element(&*flash, layout, &element, cur_nonce, management) {
                    Ok(()) => install(flash, layout, &element, kind, log)?,
                    Err(Error::FlashError) => return Err(Error::FlashError),
                    Err(e) => {
                        log_warn!(log, MODULE, "skipping {} element: {}", kind.as_str(), e);
                    }
                }
            }
        }

        match advance {
            Some(next) => offset = next,
            None => break,
        }
    }
    Ok(())
}

fn install<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    element: &StagingElement,
    kind: ElementKind,
    log: &mut LogBuffer,
) -> Result<()> {
    match kind {
        ElementKind::DownloaderUpdate => {
            install_image(flash, layout, element, ImageKind::Downloader, log)
        }
        ElementKind::CorePatcherUpdate => {
            install_image(flash, layout, element, ImageKind::CorePatcher, log)
        }
        ElementKind::AppUpdate => install_image(flash, layout, element, ImageKind::App, log),
        ElementKind::ConfigUpdate => install_config(flash, layout, element, log),
        ElementKind::DeviceIdReassocRes => install_reassoc(flash, layout, element, log),
        // Tickets and core updates are consumed elsewhere
        _ => Ok(()),
    }
}

/// Copy an image payload (header + code) into its target region
fn install_image<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    element: &StagingElement,
    target: ImageKind,
    log: &mut LogBuffer,
) -> Result<()> {
    let size = element.header.content.payload_size;
    if size < IMAGE_HEADER_SIZE as u32 || size > layout.image_region_size(target) {
        log_warn!(
            log,
            MODULE,
            "{} update payload does not fit its region, skipping",
            target.as_str()
        );
        return Ok(());
    }

    let mut chunk = [0u8; 512];
    let mut copied = 0u32;
    while copied < size {
        let n = (size - copied).min(chunk.len() as u32) as usize;
        flash.read(element.payload_addr() + copied, &mut chunk[..n])?;
        flash.write(layout.image_base(target) + copied, &chunk[..n])?;
        copied += n as u32;
    }

    log_info!(log, MODULE, "installed {} image ({} bytes)", target.as_str(), size);
    Ok(())
}

/// Install new network credentials by full-config rewrite
fn install_config<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    element: &StagingElement,
    log: &mut LogBuffer,
) -> Result<()> {
    if element.header.content.payload_size as usize != core::mem::size_of::<NetworkInfo>() {
        log_warn!(log, MODULE, "config update payload has the wrong size, skipping");
        return Ok(());
    }
    let nw_info: NetworkInfo = regions::read_record(&*flash, element.payload_addr())?;
    if nw_info.magic != KEEL_MAGIC {
        log_warn!(log, MODULE, "config update payload lacks magic, skipping");
        return Ok(());
    }

    let mut config = store::read_config(&*flash, layout)?;
    config.nw_info = nw_info;
    store::write_config(flash, layout, &config)?;

    log_info!(log, MODULE, "installed network configuration");
    Ok(())
}

/// Install the hub-issued DeviceID certificate from a re-association
/// response into the trust anchors
fn install_reassoc<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    element: &StagingElement,
    log: &mut LogBuffer,
) -> Result<()> {
    let size = element.header.content.payload_size as usize;
    let mut anchors = store::read_trust_anchors(&*flash, layout)?;

    let start = anchors.info.cert_table[SLOT_DEVICE_ID].start as usize;
    if start >= anchors.cert_bag.len() || size + 1 > anchors.cert_bag.len() - start {
        log_warn!(log, MODULE, "reassociation certificate does not fit, skipping");
        return Ok(());
    }

    flash.read(
        element.payload_addr(),
        &mut anchors.cert_bag[start..start + size],
    )?;
    anchors.cert_bag[start + size] = 0;
    anchors.info.cert_table[SLOT_DEVICE_ID] = CertSlot {
        start: start as u16,
        size: size as u16,
    };
    anchors.info.cursor = (start + size + 1) as u32;
    store::write_trust_anchors(flash, layout, &anchors)?;

    log_info!(log, MODULE, "installed reassociated DeviceID certificate");
    Ok(())
}

/// Refresh per-image metadata from the installed headers
///
/// A record is seeded when absent and advanced when the header carries
/// a version and issue time at least as new as the stored pair (and
/// strictly newer in at least one). `last_version` and
/// `last_issue_time` never decrease.
pub fn refresh_image_metadata<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
) -> Result<()> {
    let mut config = store::read_config(&*flash, layout)?;
    let mut changed = false;

    for kind in [ImageKind::CorePatcher, ImageKind::Downloader, ImageKind::App] {
        let header = image::read_header(&*flash, layout.image_base(kind))?;
        let content = header.content;
        if content.magic != KEEL_MAGIC {
            continue;
        }
        let Some(meta) = config.img_info.meta_mut(kind) else {
            continue;
        };

        if meta.magic != KEEL_MAGIC {
            *meta = ImageMeta {
                magic: KEEL_MAGIC,
                last_version: content.version,
                last_issue_time: content.issue_time,
            };
            changed = true;
        } else if content.version >= meta.last_version
            && content.issue_time >= meta.last_issue_time
            && (content.version > meta.last_version || content.issue_time > meta.last_issue_time)
        {
            meta.last_version = content.version;
            meta.last_issue_time = content.issue_time;
            changed = true;
        }
    }

    if changed {
        store::write_config(flash, layout, &config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageHeader, ImageHeaderContent};
    use crate::testutil;
    use keel_common::constants::IMAGE_NAME_SIZE;
    use keel_crypto::ecdsa::{self, derive_keypair};
    use keel_crypto::hash::sha256;
    use keel_crypto::{CryptoError, CryptoRng};
    use keel_hal::sim::SimFlash;

    struct TestRng(u64);

    impl CryptoRng for TestRng {
        fn fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), CryptoError> {
            for byte in dest.iter_mut() {
                self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
                *byte = (self.0 >> 33) as u8;
            }
            Ok(())
        }
    }

    const NONCE: [u8; NONCE_SIZE] = [0x66; NONCE_SIZE];

    /// A full image payload (header + code) in a fixed buffer
    struct ImagePayload {
        bytes: [u8; 2048],
        len: usize,
    }

    fn image_payload(
        code: &[u8],
        version: u32,
        issue_time: u64,
        signer: &keel_crypto::EccKeypair,
    ) -> ImagePayload {
        let mut header = ImageHeader::zeroed();
        header.content = ImageHeaderContent {
            magic: KEEL_MAGIC,
            hdr_size: IMAGE_HEADER_SIZE as u32,
            size: code.len() as u32,
            version,
            issue_time,
            name: [0; IMAGE_NAME_SIZE],
            digest: sha256(code),
        };
        header.signature =
            ecdsa::sign(signer, header.content.signed_bytes(), &mut TestRng(3)).unwrap();

        let mut bytes = [0u8; 2048];
        bytes[..IMAGE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        bytes[IMAGE_HEADER_SIZE..IMAGE_HEADER_SIZE + code.len()].copy_from_slice(code);
        ImagePayload {
            bytes,
            len: IMAGE_HEADER_SIZE + code.len(),
        }
    }

    fn push_element(
        flash: &mut SimFlash<{ testutil::FLASH_SIZE }>,
        layout: &MemoryLayout,
        offset: u32,
        kind: ElementKind,
        payload: &[u8],
        signer: &keel_crypto::EccKeypair,
    ) -> u32 {
        use crate::staging::{StagingHeader, StagingHeaderContent};
        use keel_common::constants::STAGING_HEADER_SIZE;

        let content = StagingHeaderContent {
            magic: KEEL_MAGIC,
            kind: kind as u32,
            payload_size: payload.len() as u32,
            digest: sha256(payload),
            nonce: NONCE,
        };
        let signature =
            ecdsa::sign(signer, crate::regions::bytes_of(&content), &mut TestRng(11)).unwrap();
        let header = StagingHeader { content, signature };

        let addr = layout.staging_base + offset;
        flash.write(addr, header.as_bytes()).unwrap();
        flash.write(addr + STAGING_HEADER_SIZE as u32, payload).unwrap();
        offset + STAGING_HEADER_SIZE as u32 + payload.len() as u32
    }

    #[test]
    fn downloader_update_is_installed_and_metadata_advances() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let management = derive_keypair(b"management key seed").unwrap();
        let code_auth = derive_keypair(b"code authority seed").unwrap();
        let mut log = LogBuffer::new();

        // Config present but metadata unseeded
        store::write_config(&mut flash, &layout, &store::ConfigData::erased()).unwrap();

        let payload = image_payload(&[0xC3; 700], 5, 5000, &code_auth);
        push_element(
            &mut flash,
            &layout,
            0,
            ElementKind::DownloaderUpdate,
            &payload.bytes[..payload.len],
            &management,
        );

        assert!(standard_updates_pending(&flash, &layout, &NONCE, &management.public()).unwrap());
        apply_updates(&mut flash, &layout, &NONCE, &management.public(), &mut log).unwrap();
        refresh_image_metadata(&mut flash, &layout).unwrap();

        // The image region now carries the payload
        let header = image::read_header(&flash, layout.downloader_base).unwrap();
        assert_eq!(header.content.version, 5);

        // Metadata was seeded from the installed header
        let config = store::read_config(&flash, &layout).unwrap();
        assert_eq!(config.img_info.downloader.last_version, 5);
        assert_eq!(config.img_info.downloader.last_issue_time, 5000);
    }

    #[test]
    fn stale_elements_are_skipped_without_install() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let management = derive_keypair(b"management key seed").unwrap();
        let code_auth = derive_keypair(b"code authority seed").unwrap();
        let mut log = LogBuffer::new();

        store::write_config(&mut flash, &layout, &store::ConfigData::erased()).unwrap();

        // Element bound to a different epoch
        let payload = image_payload(&[0xC3; 128], 5, 5000, &code_auth);
        {
            use crate::staging::{StagingHeader, StagingHeaderContent};
            use keel_common::constants::STAGING_HEADER_SIZE;
            let content = StagingHeaderContent {
                magic: KEEL_MAGIC,
                kind: ElementKind::DownloaderUpdate as u32,
                payload_size: payload.len as u32,
                digest: sha256(&payload.bytes[..payload.len]),
                nonce: [0x99; NONCE_SIZE],
            };
            let signature = ecdsa::sign(
                &management,
                crate::regions::bytes_of(&content),
                &mut TestRng(13),
            )
            .unwrap();
            let header = StagingHeader { content, signature };
            flash.write(layout.staging_base, header.as_bytes()).unwrap();
            flash
                .write(
                    layout.staging_base + STAGING_HEADER_SIZE as u32,
                    &payload.bytes[..payload.len],
                )
                .unwrap();
        }

        assert!(!standard_updates_pending(&flash, &layout, &NONCE, &management.public()).unwrap());
        apply_updates(&mut flash, &layout, &NONCE, &management.public(), &mut log).unwrap();

        // Region untouched
        let header = image::read_header(&flash, layout.downloader_base).unwrap();
        assert_ne!(header.content.magic, KEEL_MAGIC);
    }

    #[test]
    fn metadata_never_decreases() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let code_auth = derive_keypair(b"code authority seed").unwrap();

        let mut config = store::ConfigData::erased();
        config.img_info.app = ImageMeta {
            magic: KEEL_MAGIC,
            last_version: 9,
            last_issue_time: 9000,
        };
        store::write_config(&mut flash, &layout, &config).unwrap();

        // An older (valid-looking) app image sits in the region
        let payload = image_payload(&[0x11; 64], 3, 3000, &code_auth);
        flash
            .write(layout.app_base, &payload.bytes[..payload.len])
            .unwrap();

        refresh_image_metadata(&mut flash, &layout).unwrap();

        let config = store::read_config(&flash, &layout).unwrap();
        assert_eq!(config.img_info.app.last_version, 9);
        assert_eq!(config.img_info.app.last_issue_time, 9000);
    }

    #[test]
    fn config_update_installs_network_info() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let management = derive_keypair(b"management key seed").unwrap();
        let mut log = LogBuffer::new();

        store::write_config(&mut flash, &layout, &store::ConfigData::erased()).unwrap();

        let nw_info = NetworkInfo {
            magic: KEEL_MAGIC,
            ssid: [0x41; 32],
            psk: [0x42; 64],
            reserved: [0; 4],
        };
        push_element(
            &mut flash,
            &layout,
            0,
            ElementKind::ConfigUpdate,
            crate::regions::bytes_of(&nw_info),
            &management,
        );

        apply_updates(&mut flash, &layout, &NONCE, &management.public(), &mut log).unwrap();

        let config = store::read_config(&flash, &layout).unwrap();
        assert_eq!(config.nw_info.magic, KEEL_MAGIC);
        assert_eq!(config.nw_info.ssid, [0x41; 32]);
        // The rest of the record survived the rewrite
        assert_ne!(config.static_symm_info.magic, KEEL_MAGIC);
    }
}
