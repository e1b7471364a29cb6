// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Persistent data store
//!
//! Two flash records back the core's durable state:
//!
//! - **Trust anchors**: the DeviceID public key, the management and
//!   code-authority verification keys, and the device certificate bag
//!   with its `(start, size)` slot table.
//! - **Config data**: optional network credentials, the one-time
//!   `static_symm` provisioning secret, and per-image anti-rollback
//!   metadata.
//!
//! Every update is read-modify-write on a RAM copy followed by a
//! full-record flash write. Records are sized in whole flash pages.
//!
//! Layout (trust anchors, 3072 bytes):
//! ```text
//! Offset  Size   Field
//! 0x000   4      magic
//! 0x004   4      cert bag cursor
//! 0x008   8      cert table: (start, size) × {HUB, DEVICEID}
//! 0x010   256    DeviceID public key PEM
//! 0x110   256    management public key PEM
//! 0x210   256    code-authority public key PEM
//! 0x310   2288   cert bag
//! ```

use keel_common::constants::{
    CONFIG_DATA_SIZE, FLASH_ERASED_BYTE, FLASH_PAGE_SIZE, KEEL_MAGIC, SYMM_KEY_SIZE,
    TRUST_ANCHORS_CERT_BAG_SIZE, TRUST_ANCHORS_SIZE, UUID_SIZE,
};
use keel_common::{Error, ImageKind, MemoryLayout, PemBuf, Result};
use keel_crypto::{is_zero, secure_zero};
use keel_hal::FlashInterface;

use crate::regions::{self, Record};

/// Trust-anchor cert table slot for the hub certificate
pub const SLOT_HUB: usize = 0;
/// Trust-anchor cert table slot for the DeviceID certificate (or CSR)
pub const SLOT_DEVICE_ID: usize = 1;

/// One cert table entry: `[start, start + size)` within the cert bag,
/// excluding the NUL terminator
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CertSlot {
    /// Offset of the entry within the bag
    pub start: u16,
    /// Entry size in bytes
    pub size: u16,
}

/// Fixed-offset head of the trust anchors record
#[repr(C)]
#[derive(Clone)]
pub struct TrustAnchorsInfo {
    /// `KEEL_MAGIC` once the record has been written
    pub magic: u32,
    /// Append cursor into the cert bag
    pub cursor: u32,
    /// Certificate table, indexed by `SLOT_*`
    pub cert_table: [CertSlot; 2],
    /// DeviceID public key PEM
    pub dev_pub_key: PemBuf,
    /// Management service public key PEM (verifies staging elements)
    pub management_pub_key: PemBuf,
    /// Code authority public key PEM (verifies image headers)
    pub code_auth_pub_key: PemBuf,
}

/// The trust anchors record
#[repr(C)]
#[derive(Clone)]
pub struct TrustAnchors {
    /// Record head
    pub info: TrustAnchorsInfo,
    /// Certificate bag; entries are NUL-terminated PEM documents
    pub cert_bag: [u8; TRUST_ANCHORS_CERT_BAG_SIZE],
}

/// Optional network credentials for the update downloader
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NetworkInfo {
    /// `KEEL_MAGIC` when credentials are present
    pub magic: u32,
    /// Network SSID, NUL-padded
    pub ssid: [u8; 32],
    /// Pre-shared key, NUL-padded
    pub psk: [u8; 64],
    /// Reserved
    pub reserved: [u8; 4],
}

/// The one-time symmetric provisioning secret and its device binding
#[repr(C)]
#[derive(Clone)]
pub struct StaticSymmInfo {
    /// `KEEL_MAGIC` once the record has been written
    pub magic: u32,
    /// `static_symm`; all-zero on every boot after the first
    pub static_symm: [u8; SYMM_KEY_SIZE],
    /// Device UUID captured at initial boot
    pub dev_uuid: [u8; UUID_SIZE],
    /// Reserved
    pub reserved: [u8; 4],
}

/// Anti-rollback metadata for one image
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    /// `KEEL_MAGIC` once the record has been seeded
    pub magic: u32,
    /// Highest accepted image version; never decreases
    pub last_version: u32,
    /// Latest accepted issue time; never decreases
    pub last_issue_time: u64,
}

/// Metadata for the three non-core images
#[repr(C)]
#[derive(Clone)]
pub struct ImagesInfo {
    /// Core patcher metadata
    pub cpatcher: ImageMeta,
    /// Update downloader metadata
    pub downloader: ImageMeta,
    /// Application metadata
    pub app: ImageMeta,
}

impl ImagesInfo {
    /// Metadata record for `kind`; the core image carries none
    #[must_use]
    pub fn meta(&self, kind: ImageKind) -> Option<&ImageMeta> {
        match kind {
            ImageKind::Core => None,
            ImageKind::CorePatcher => Some(&self.cpatcher),
            ImageKind::Downloader => Some(&self.downloader),
            ImageKind::App => Some(&self.app),
        }
    }

    /// Mutable metadata record for `kind`
    pub fn meta_mut(&mut self, kind: ImageKind) -> Option<&mut ImageMeta> {
        match kind {
            ImageKind::Core => None,
            ImageKind::CorePatcher => Some(&mut self.cpatcher),
            ImageKind::Downloader => Some(&mut self.downloader),
            ImageKind::App => Some(&mut self.app),
        }
    }
}

/// The config data record
#[repr(C)]
#[derive(Clone)]
pub struct ConfigData {
    /// Network credentials, when provisioned
    pub nw_info: NetworkInfo,
    /// One-time provisioning secret
    pub static_symm_info: StaticSymmInfo,
    /// Per-image anti-rollback metadata
    pub img_info: ImagesInfo,
    /// Reserved up to the page boundary
    pub reserved: [u8; 304],
}

// SAFETY: repr(C), integers and byte arrays only, no implicit padding
// (layouts asserted below).
unsafe impl Record for TrustAnchors {}
// SAFETY: as above.
unsafe impl Record for ConfigData {}
// SAFETY: as above.
unsafe impl Record for NetworkInfo {}

const _: () = assert!(core::mem::size_of::<TrustAnchorsInfo>() == 784);
const _: () = assert!(core::mem::size_of::<TrustAnchors>() == TRUST_ANCHORS_SIZE);
const _: () = assert!(core::mem::size_of::<NetworkInfo>() == 104);
const _: () = assert!(core::mem::size_of::<StaticSymmInfo>() == 56);
const _: () = assert!(core::mem::size_of::<ImageMeta>() == 16);
const _: () = assert!(core::mem::size_of::<ConfigData>() == CONFIG_DATA_SIZE);
const _: () = assert!(TRUST_ANCHORS_SIZE % FLASH_PAGE_SIZE == 0);
const _: () = assert!(CONFIG_DATA_SIZE % FLASH_PAGE_SIZE == 0);

impl TrustAnchors {
    /// An all-zero record with an erased (0xFF) cert bag
    #[must_use]
    pub fn first_boot() -> Self {
        let mut anchors: Self = regions::filled(0);
        anchors.cert_bag = [FLASH_ERASED_BYTE; TRUST_ANCHORS_CERT_BAG_SIZE];
        anchors
    }

    /// The raw record bytes, for full-structure flash writes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

impl ConfigData {
    /// An all-erased (0xFF) record
    #[must_use]
    pub fn erased() -> Self {
        regions::filled(FLASH_ERASED_BYTE)
    }

    /// The raw record bytes, for full-structure flash writes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

/// Read the trust anchors record
pub fn read_trust_anchors<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
) -> Result<TrustAnchors> {
    regions::read_record(flash, layout.trust_anchors_base())
}

/// Rewrite the trust anchors record
pub fn write_trust_anchors<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    anchors: &TrustAnchors,
) -> Result<()> {
    regions::write_record(flash, layout.trust_anchors_base(), anchors)
}

/// Read the config data record
pub fn read_config<F: FlashInterface>(flash: &F, layout: &MemoryLayout) -> Result<ConfigData> {
    regions::read_record(flash, layout.config_data_base())
}

/// Rewrite the config data record
pub fn write_config<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    config: &ConfigData,
) -> Result<()> {
    regions::write_record(flash, layout.config_data_base(), config)
}

/// Erase the whole data store to the 0xFF pattern
pub fn erase_data_store<F: FlashInterface>(flash: &mut F, layout: &MemoryLayout) -> Result<()> {
    flash.erase(layout.data_store_base, layout.data_store_size())?;
    Ok(())
}

/// Persist `static_symm` at initial boot
///
/// Builds the initial config record in RAM (everything else left at the
/// erased pattern), writes it, then scrubs the local copy of the
/// secret.
pub fn store_static_symm<F: FlashInterface>(
    flash: &mut F,
    layout: &MemoryLayout,
    static_symm: &[u8; SYMM_KEY_SIZE],
    dev_uuid: &[u8; UUID_SIZE],
) -> Result<()> {
    let mut config = ConfigData::erased();
    config.static_symm_info.static_symm = *static_symm;
    config.static_symm_info.dev_uuid = *dev_uuid;
    config.static_symm_info.magic = KEEL_MAGIC;

    let result = write_config(flash, layout, &config);
    secure_zero(&mut config.static_symm_info.static_symm);
    result
}

/// Wipe `static_symm` from flash on a non-initial boot
///
/// Returns `true` when a wipe was performed, `false` when the secret
/// was already zero.
pub fn wipe_static_symm<F: FlashInterface>(flash: &mut F, layout: &MemoryLayout) -> Result<bool> {
    let mut config = read_config(flash, layout)?;
    if is_zero(&config.static_symm_info.static_symm) {
        return Ok(false);
    }

    secure_zero(&mut config.static_symm_info.static_symm);
    config.static_symm_info.magic = KEEL_MAGIC;
    write_config(flash, layout, &config)?;
    Ok(true)
}

/// Check whether provisioning has completed
///
/// True iff the trust anchors and all four layer headers carry the
/// magic. Until then the device blocks and waits for the hub.
pub fn provisioning_complete<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
) -> Result<bool> {
    if read_magic(flash, layout.trust_anchors_base())? != KEEL_MAGIC {
        return Ok(false);
    }
    for kind in [
        ImageKind::Core,
        ImageKind::CorePatcher,
        ImageKind::Downloader,
        ImageKind::App,
    ] {
        if read_magic(flash, layout.image_base(kind))? != KEEL_MAGIC {
            return Ok(false);
        }
    }
    Ok(true)
}

fn read_magic<F: FlashInterface>(flash: &F, address: u32) -> Result<u32> {
    let mut bytes = [0u8; 4];
    flash.read(address, &mut bytes).map_err(Error::from)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use keel_hal::sim::SimFlash;

    #[test]
    fn static_symm_is_stored_then_wiped() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);

        store_static_symm(&mut flash, &layout, &[0x11; SYMM_KEY_SIZE], &[0x33; UUID_SIZE])
            .unwrap();
        let config = read_config(&flash, &layout).unwrap();
        assert_eq!(config.static_symm_info.magic, KEEL_MAGIC);
        assert_eq!(config.static_symm_info.static_symm, [0x11; SYMM_KEY_SIZE]);
        assert_eq!(config.static_symm_info.dev_uuid, [0x33; UUID_SIZE]);

        assert!(wipe_static_symm(&mut flash, &layout).unwrap());
        let config = read_config(&flash, &layout).unwrap();
        assert!(is_zero(&config.static_symm_info.static_symm));
        assert_eq!(config.static_symm_info.magic, KEEL_MAGIC);

        // Second wipe is a no-op
        assert!(!wipe_static_symm(&mut flash, &layout).unwrap());
    }

    #[test]
    fn erase_resets_both_records() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);

        let mut anchors = TrustAnchors::first_boot();
        anchors.info.magic = KEEL_MAGIC;
        write_trust_anchors(&mut flash, &layout, &anchors).unwrap();

        erase_data_store(&mut flash, &layout).unwrap();
        let anchors = read_trust_anchors(&flash, &layout).unwrap();
        assert_ne!(anchors.info.magic, KEEL_MAGIC);
        let config = read_config(&flash, &layout).unwrap();
        assert_ne!(config.static_symm_info.magic, KEEL_MAGIC);
    }

    #[test]
    fn provisioning_requires_anchors_and_all_four_headers() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        assert!(!provisioning_complete(&flash, &layout).unwrap());

        let mut anchors = TrustAnchors::first_boot();
        anchors.info.magic = KEEL_MAGIC;
        write_trust_anchors(&mut flash, &layout, &anchors).unwrap();
        assert!(!provisioning_complete(&flash, &layout).unwrap());

        for kind in [
            ImageKind::Core,
            ImageKind::CorePatcher,
            ImageKind::Downloader,
            ImageKind::App,
        ] {
            assert!(!provisioning_complete(&flash, &layout).unwrap());
            flash
                .write(layout.image_base(kind), &KEEL_MAGIC.to_le_bytes())
                .unwrap();
        }
        assert!(provisioning_complete(&flash, &layout).unwrap());
    }
}
