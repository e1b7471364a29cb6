// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! CSR issuance and the per-boot certificate store
//!
//! Two responsibilities:
//!
//! - On identity change the core issues a DeviceID CSR into the
//!   trust-anchors cert bag. The management service signs it during
//!   provisioning (or through the update protocol) and writes the
//!   certificate back.
//! - Every boot the core assembles the image certificate store handed
//!   to the next layer: the hub certificate when present, the DeviceID
//!   certificate, and a freshly issued AliasID certificate signed by
//!   the DeviceID keypair.
//!
//! Every bag entry is NUL-terminated; table slots record `(start,
//! size)` without the terminator; the magic is set only once a store is
//! complete.

use keel_common::constants::{CERT_STORE_BAG_SIZE, CERT_STORE_SIZE, KEEL_MAGIC};
use keel_common::{Error, MemoryLayout, PemBuf, Result};
use keel_crypto::x509::{self, Name};
use keel_crypto::{pem, CryptoRng, EccKeypair};
use keel_hal::FlashInterface;

use crate::regions::{self, Record};
use crate::store::{self, CertSlot, TrustAnchors, SLOT_DEVICE_ID, SLOT_HUB};

/// Image cert store slot for the hub certificate
pub const IMG_SLOT_HUB: usize = 0;
/// Image cert store slot for the DeviceID certificate
pub const IMG_SLOT_DEVICE_ID: usize = 1;
/// Image cert store slot for the AliasID certificate
pub const IMG_SLOT_ALIAS_ID: usize = 2;

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

/// Fixed-offset head of the image certificate store
#[repr(C)]
#[derive(Clone)]
pub struct ImageCertStoreInfo {
    /// `KEEL_MAGIC` once the store is complete
    pub magic: u32,
    /// Append cursor into the cert bag
    pub cursor: u32,
    /// Certificate table, indexed by `IMG_SLOT_*`
    pub cert_table: [CertSlot; 3],
    /// DeviceID public key PEM
    pub dev_pub_key: PemBuf,
    /// Management service public key PEM, forwarded to upper layers
    pub management_pub_key: PemBuf,
}

/// The per-boot certificate store in the next layer's RAM
#[repr(C)]
#[derive(Clone)]
pub struct ImageCertStore {
    /// Store head
    pub info: ImageCertStoreInfo,
    /// Certificate bag; entries are NUL-terminated PEM documents
    pub cert_bag: [u8; CERT_STORE_BAG_SIZE],
}

// SAFETY: repr(C), integers and byte arrays only, no implicit padding
// (sizes asserted below).
unsafe impl Record for ImageCertStore {}

const _: () = assert!(core::mem::size_of::<ImageCertStoreInfo>() == 532);
const _: () = assert!(core::mem::size_of::<ImageCertStore>() == CERT_STORE_SIZE);

impl ImageCertStore {
    /// An all-zero store
    #[must_use]
    pub fn zeroed() -> Self {
        regions::filled(0)
    }

    /// The PEM bytes of a table slot, without the NUL terminator
    #[must_use]
    pub fn entry(&self, slot: usize) -> Option<&[u8]> {
        let entry = self.info.cert_table.get(slot)?;
        if entry.size == 0 {
            return None;
        }
        let start = entry.start as usize;
        let end = start.checked_add(entry.size as usize)?;
        self.cert_bag.get(start..end)
    }
}

/// Issue a DeviceID CSR and persist it with the new public key
///
/// On first boot the trust anchors start from scratch (zeroed head,
/// erased bag). On a later identity change the CSR overwrites the
/// DEVICEID slot in place when provisioning is complete, otherwise the
/// bag restarts at zero. The record magic is set on every write.
pub fn create_device_id_csr<F: FlashInterface, R: CryptoRng>(
    flash: &mut F,
    layout: &MemoryLayout,
    device_id: &EccKeypair,
    first_boot: bool,
    provisioned: bool,
    rng: &mut R,
) -> Result<()> {
    let mut anchors = if first_boot {
        TrustAnchors::first_boot()
    } else {
        store::read_trust_anchors(&*flash, layout)?
    };

    anchors.info.dev_pub_key = pem::public_key_to_pem(&device_id.public())?;

    let (cursor, capacity) = if first_boot {
        (0, anchors.cert_bag.len())
    } else if anchors.info.cursor == 0 {
        // A previous CSR must have established the bag
        return Err(Error::Corrupted);
    } else if provisioned {
        let slot = anchors.info.cert_table[SLOT_DEVICE_ID];
        (slot.start as usize, slot.size as usize)
    } else {
        (0, anchors.cert_bag.len())
    };
    if cursor >= anchors.cert_bag.len() || capacity > anchors.cert_bag.len() - cursor {
        return Err(Error::Corrupted);
    }

    let len = x509::write_csr_pem(
        &DEVICE_ID_NAME,
        device_id,
        rng,
        &mut anchors.cert_bag[cursor..cursor + capacity],
    )?;

    anchors.info.cert_table[SLOT_DEVICE_ID] = CertSlot {
        start: cursor as u16,
        size: len as u16,
    };
    let end = cursor + len;
    if end >= anchors.cert_bag.len() {
        return Err(Error::BufferTooSmall);
    }
    anchors.cert_bag[end] = 0;
    anchors.info.cursor = (end + 1) as u32;
    anchors.info.magic = KEEL_MAGIC;

    store::write_trust_anchors(flash, layout, &anchors)
}

/// Assemble the image certificate store for the next layer
pub fn build_cert_store<R: CryptoRng>(
    anchors: &TrustAnchors,
    device_id: &EccKeypair,
    alias_id: &EccKeypair,
    rng: &mut R,
    out: &mut ImageCertStore,
) -> Result<()> {
    *out = ImageCertStore::zeroed();
    out.info.dev_pub_key = pem::public_key_to_pem(&device_id.public())?;
    out.info.management_pub_key = anchors.info.management_pub_key;

    let mut cursor = 0;

    // Hub certificate, once provisioning has delivered one
    let hub = anchors.info.cert_table[SLOT_HUB];
    if hub.size != 0 {
        cursor = copy_entry(
            &anchors.cert_bag,
            hub,
            &mut out.cert_bag,
            cursor,
            &mut out.info.cert_table[IMG_SLOT_HUB],
        )?;
    }

    // DeviceID certificate (or the pending CSR before first issuance)
    let device = anchors.info.cert_table[SLOT_DEVICE_ID];
    cursor = copy_entry(
        &anchors.cert_bag,
        device,
        &mut out.cert_bag,
        cursor,
        &mut out.info.cert_table[IMG_SLOT_DEVICE_ID],
    )?;

    // Freshly issued AliasID certificate
    let len = x509::write_cert_pem(
        &DEVICE_ID_NAME,
        &ALIAS_ID_NAME,
        &alias_id.public(),
        device_id,
        rng,
        &mut out.cert_bag[cursor..],
    )?;
    out.info.cert_table[IMG_SLOT_ALIAS_ID] = CertSlot {
        start: cursor as u16,
        size: len as u16,
    };
    cursor += len;
    if cursor >= out.cert_bag.len() {
        return Err(Error::BufferTooSmall);
    }
    out.cert_bag[cursor] = 0;
    out.info.cursor = (cursor + 1) as u32;

    out.info.magic = KEEL_MAGIC;
    Ok(())
}

fn copy_entry(
    src_bag: &[u8],
    slot: CertSlot,
    dst_bag: &mut [u8],
    cursor: usize,
    out_slot: &mut CertSlot,
) -> Result<usize> {
    let start = slot.start as usize;
    let size = slot.size as usize;
    if start.checked_add(size).map_or(true, |end| end > src_bag.len()) {
        return Err(Error::Corrupted);
    }
    if cursor + size + 1 > dst_bag.len() {
        return Err(Error::BufferTooSmall);
    }

    dst_bag[cursor..cursor + size].copy_from_slice(&src_bag[start..start + size]);
    *out_slot = CertSlot {
        start: cursor as u16,
        size: size as u16,
    };
    let end = cursor + size;
    dst_bag[end] = 0;
    Ok(end + 1)
}
