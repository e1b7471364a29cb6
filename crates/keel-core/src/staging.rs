// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Staging area scanner and verifier
//!
//! The management service appends `(authenticated header, payload)`
//! records to the staging flash region. The scan is a linear walk from
//! offset 0 that stops at the first header whose magic does not match
//! (erased flash reads 0xFF, so an empty area terminates immediately).
//!
//! Header acceptance is all-or-nothing, in this order: magic, known
//! element kind, non-zero payload size, payload bounds, payload digest,
//! nonce freshness, management signature. The nonce check binds every
//! element to exactly one boot epoch; a replayed ticket from an earlier
//! boot dies there.
//!
//! [`find`] is structural and only locates an element; any decision
//! that *admits* an element must go through [`find_verified`].

use core::fmt;

use keel_common::constants::{KEEL_MAGIC, NONCE_SIZE, STAGING_HEADER_SIZE};
use keel_common::{Error, MemoryLayout, Result};
use keel_crypto::hash::Sha256;
use keel_crypto::{constant_time_eq, ecdsa, EccPublicKey};
use keel_hal::FlashInterface;

use crate::regions::{self, Record};

/// Staging element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ElementKind {
    /// Authorizes booting the application this epoch
    BootTicket = 1,
    /// Carries the watchdog deferral for this epoch
    DeferralTicket = 2,
    /// New core image; applied by the core patcher, never by the core
    CoreUpdate = 3,
    /// New update downloader image
    DownloaderUpdate = 4,
    /// New core patcher image
    CorePatcherUpdate = 5,
    /// New application image
    AppUpdate = 6,
    /// New network configuration
    ConfigUpdate = 7,
    /// Hub response closing the device re-association protocol
    DeviceIdReassocRes = 8,
}

impl ElementKind {
    /// Decode the wire value
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::BootTicket),
            2 => Some(Self::DeferralTicket),
            3 => Some(Self::CoreUpdate),
            4 => Some(Self::DownloaderUpdate),
            5 => Some(Self::CorePatcherUpdate),
            6 => Some(Self::AppUpdate),
            7 => Some(Self::ConfigUpdate),
            8 => Some(Self::DeviceIdReassocRes),
            _ => None,
        }
    }

    /// Get the element kind name for trace output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BootTicket => "boot ticket",
            Self::DeferralTicket => "deferral ticket",
            Self::CoreUpdate => "core update",
            Self::DownloaderUpdate => "downloader update",
            Self::CorePatcherUpdate => "core patcher update",
            Self::AppUpdate => "app update",
            Self::ConfigUpdate => "config update",
            Self::DeviceIdReassocRes => "reassociation response",
        }
    }

    /// Whether the core installs this element itself
    ///
    /// Core updates are not standard: only the core patcher may rewrite
    /// the core region. Tickets are consumed, never installed.
    #[must_use]
    pub const fn is_standard_update(&self) -> bool {
        matches!(
            self,
            Self::DownloaderUpdate
                | Self::CorePatcherUpdate
                | Self::AppUpdate
                | Self::ConfigUpdate
                | Self::DeviceIdReassocRes
        )
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed portion of a staging element header
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StagingHeaderContent {
    /// `KEEL_MAGIC`
    pub magic: u32,
    /// Element kind wire value
    pub kind: u32,
    /// Payload size in bytes; the payload immediately follows the header
    pub payload_size: u32,
    /// SHA-256 digest of the payload
    pub digest: [u8; 32],
    /// Boot nonce binding this element to one epoch
    pub nonce: [u8; NONCE_SIZE],
}

impl StagingHeaderContent {
    /// The byte range the management signature covers
    #[must_use]
    pub fn signed_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

/// A staging element header: signed content plus the signature
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StagingHeader {
    /// Signed content
    pub content: StagingHeaderContent,
    /// ECDSA signature by the management key over `content`
    pub signature: [u8; 64],
}

impl StagingHeader {
    /// The raw header bytes, for staging writers
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

// SAFETY: repr(C), integers and byte arrays only, no implicit padding
// (sizes asserted below).
unsafe impl Record for StagingHeaderContent {}
// SAFETY: as above.
unsafe impl Record for StagingHeader {}

const _: () = assert!(core::mem::size_of::<StagingHeaderContent>() == 76);
const _: () = assert!(core::mem::size_of::<StagingHeader>() == STAGING_HEADER_SIZE);

/// A located staging element
#[derive(Clone, Copy)]
pub struct StagingElement {
    /// The element header, copied out of flash
    pub header: StagingHeader,
    /// Flash address of the header
    pub addr: u32,
}

impl StagingElement {
    /// Flash address of the payload
    #[must_use]
    pub fn payload_addr(&self) -> u32 {
        self.addr + STAGING_HEADER_SIZE as u32
    }

    /// The decoded element kind, if known
    #[must_use]
    pub fn kind(&self) -> Option<ElementKind> {
        ElementKind::from_u32(self.header.content.kind)
    }
}

/// Read the element at `offset`, if a structurally present one starts there
///
/// Returns `None` when the header would overrun the region or its magic
/// does not match — both terminate a scan.
pub fn element_at<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    offset: u32,
) -> Result<Option<StagingElement>> {
    if offset.saturating_add(STAGING_HEADER_SIZE as u32) > layout.staging_size {
        return Ok(None);
    }
    let addr = layout.staging_base + offset;
    let header: StagingHeader = regions::read_record(flash, addr)?;
    if header.content.magic != KEEL_MAGIC {
        return Ok(None);
    }
    Ok(Some(StagingElement { header, addr }))
}

/// Offset of the element after `element`, if it stays inside the region
#[must_use]
pub fn next_offset(layout: &MemoryLayout, element: &StagingElement) -> Option<u32> {
    let offset = element.addr - layout.staging_base;
    let next = (offset as u64)
        + (STAGING_HEADER_SIZE as u64)
        + u64::from(element.header.content.payload_size);
    if next >= u64::from(layout.staging_size) {
        None
    } else {
        Some(next as u32)
    }
}

/// Count the structurally valid elements before the first bad magic
pub fn count_elements<F: FlashInterface>(flash: &F, layout: &MemoryLayout) -> Result<u32> {
    let mut count = 0;
    let mut offset = 0;
    while let Some(element) = element_at(flash, layout, offset)? {
        count += 1;
        match next_offset(layout, &element) {
            Some(next) => offset = next,
            None => break,
        }
    }
    Ok(count)
}

/// Locate the first element of `kind` (structural check only)
pub fn find<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    kind: ElementKind,
) -> Result<Option<StagingElement>> {
    let mut offset = 0;
    while let Some(element) = element_at(flash, layout, offset)? {
        if element.kind() == Some(kind) {
            return Ok(Some(element));
        }
        match next_offset(layout, &element) {
            Some(next) => offset = next,
            None => break,
        }
    }
    Ok(None)
}

/// Fully verify a located element's header
///
/// # Errors
///
/// `Corrupted` (magic or bounds), `InvalidInput` (unknown kind or empty
/// payload), `BadDigest`, `StaleNonce` or `BadSignature` — in that
/// check order. All must pass for the element to be admitted.
pub fn verify_element<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    element: &StagingElement,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
) -> Result<()> {
    let content = &element.header.content;

    if content.magic != KEEL_MAGIC {
        return Err(Error::Corrupted);
    }
    if ElementKind::from_u32(content.kind).is_none() {
        return Err(Error::InvalidInput);
    }
    if content.payload_size == 0 {
        return Err(Error::InvalidInput);
    }
    let payload_end = u64::from(element.payload_addr()) + u64::from(content.payload_size);
    if payload_end > u64::from(layout.staging_end()) {
        return Err(Error::Corrupted);
    }

    let digest = digest_payload(flash, element.payload_addr(), content.payload_size)?;
    if !constant_time_eq(&digest, &content.digest) {
        return Err(Error::BadDigest);
    }

    if !constant_time_eq(&content.nonce, cur_nonce) {
        return Err(Error::StaleNonce);
    }

    ecdsa::verify(management, content.signed_bytes(), &element.header.signature)
        .map_err(|_| Error::BadSignature)
}

/// Locate and fully verify the first element of `kind`
///
/// `Ok(None)` when no element of the kind is staged; an element that is
/// present but fails verification propagates its error.
pub fn find_verified<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    kind: ElementKind,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
) -> Result<Option<StagingElement>> {
    match find(flash, layout, kind)? {
        None => Ok(None),
        Some(element) => {
            verify_element(flash, layout, &element, cur_nonce, management)?;
            Ok(Some(element))
        }
    }
}

/// Read the watchdog deferral from a verified DEFERRAL_TICKET
///
/// `Ok(None)` when no ticket is staged. The payload is a little-endian
/// `u32` number of seconds.
pub fn deferral_time<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    cur_nonce: &[u8; NONCE_SIZE],
    management: &EccPublicKey,
) -> Result<Option<u32>> {
    let Some(element) = find_verified(flash, layout, ElementKind::DeferralTicket, cur_nonce, management)?
    else {
        return Ok(None);
    };
    if element.header.content.payload_size < 4 {
        return Err(Error::InvalidInput);
    }
    let mut bytes = [0u8; 4];
    flash.read(element.payload_addr(), &mut bytes)?;
    Ok(Some(u32::from_le_bytes(bytes)))
}

fn digest_payload<F: FlashInterface>(flash: &F, addr: u32, size: u32) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 256];
    let mut remaining = size;
    let mut cursor = addr;
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u32) as usize;
        flash.read(cursor, &mut chunk[..n])?;
        hasher.update(&chunk[..n]);
        cursor += n as u32;
        remaining -= n as u32;
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use keel_crypto::ecdsa::derive_keypair;
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

    fn management() -> keel_crypto::EccKeypair {
        derive_keypair(b"management key seed").unwrap()
    }

    fn push_element(
        flash: &mut SimFlash<{ testutil::FLASH_SIZE }>,
        layout: &MemoryLayout,
        offset: u32,
        kind: u32,
        payload: &[u8],
        nonce: &[u8; NONCE_SIZE],
        signer: &keel_crypto::EccKeypair,
    ) -> u32 {
        let content = StagingHeaderContent {
            magic: KEEL_MAGIC,
            kind,
            payload_size: payload.len() as u32,
            digest: sha256(payload),
            nonce: *nonce,
        };
        let signature =
            ecdsa::sign(signer, content.signed_bytes(), &mut TestRng(offset as u64 + 1)).unwrap();
        let header = StagingHeader { content, signature };

        let addr = layout.staging_base + offset;
        use keel_hal::FlashInterface as _;
        flash.write(addr, header.as_bytes()).unwrap();
        flash
            .write(addr + STAGING_HEADER_SIZE as u32, payload)
            .unwrap();
        offset + STAGING_HEADER_SIZE as u32 + payload.len() as u32
    }

    #[test]
    fn empty_area_scans_to_zero() {
        let layout = testutil::layout();
        let flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        assert_eq!(count_elements(&flash, &layout).unwrap(), 0);
    }

    #[test]
    fn scan_counts_until_first_bad_magic() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();

        let next = push_element(&mut flash, &layout, 0, 1, &[1, 2, 3], &NONCE, &signer);
        push_element(&mut flash, &layout, next, 2, &[4; 4], &NONCE, &signer);
        assert_eq!(count_elements(&flash, &layout).unwrap(), 2);
    }

    #[test]
    fn find_locates_by_kind() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();

        let next = push_element(&mut flash, &layout, 0, 2, &[60, 0, 0, 0], &NONCE, &signer);
        push_element(&mut flash, &layout, next, 1, &[9], &NONCE, &signer);

        let ticket = find(&flash, &layout, ElementKind::BootTicket).unwrap().unwrap();
        assert_eq!(ticket.kind(), Some(ElementKind::BootTicket));
        assert!(find(&flash, &layout, ElementKind::CoreUpdate).unwrap().is_none());
    }

    #[test]
    fn verification_accepts_a_well_formed_element() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();
        push_element(&mut flash, &layout, 0, 1, &[1, 2, 3], &NONCE, &signer);

        let element = find(&flash, &layout, ElementKind::BootTicket).unwrap().unwrap();
        verify_element(&flash, &layout, &element, &NONCE, &signer.public()).unwrap();
    }

    #[test]
    fn stale_nonce_is_rejected_even_when_well_signed() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();
        let old_nonce = [0x11; NONCE_SIZE];
        push_element(&mut flash, &layout, 0, 1, &[1, 2, 3], &old_nonce, &signer);

        let element = find(&flash, &layout, ElementKind::BootTicket).unwrap().unwrap();
        assert_eq!(
            verify_element(&flash, &layout, &element, &NONCE, &signer.public()).unwrap_err(),
            Error::StaleNonce
        );
    }

    #[test]
    fn corrupted_payload_fails_the_digest() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();
        push_element(&mut flash, &layout, 0, 1, &[1, 2, 3], &NONCE, &signer);

        let element = find(&flash, &layout, ElementKind::BootTicket).unwrap().unwrap();
        use keel_hal::FlashInterface as _;
        flash.write(element.payload_addr(), &[0xEE]).unwrap();

        assert_eq!(
            verify_element(&flash, &layout, &element, &NONCE, &signer.public()).unwrap_err(),
            Error::BadDigest
        );
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let impostor = derive_keypair(b"not the management key").unwrap();
        push_element(&mut flash, &layout, 0, 1, &[1, 2, 3], &NONCE, &impostor);

        let element = find(&flash, &layout, ElementKind::BootTicket).unwrap().unwrap();
        assert_eq!(
            verify_element(&flash, &layout, &element, &NONCE, &management().public()).unwrap_err(),
            Error::BadSignature
        );
    }

    #[test]
    fn deferral_ticket_yields_its_seconds() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = management();
        push_element(&mut flash, &layout, 0, 2, &120u32.to_le_bytes(), &NONCE, &signer);

        assert_eq!(
            deferral_time(&flash, &layout, &NONCE, &signer.public()).unwrap(),
            Some(120)
        );
    }
}
