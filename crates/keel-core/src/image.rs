// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Image header and verifier
//!
//! Every executable layer's flash region begins with a 512-byte header;
//! the code segment follows at `hdr_size`. Verification runs six checks
//! in order: magic, code placement, code digest, code-authority
//! signature, metadata magic, anti-rollback. Ties on version and issue
//! time are allowed so the same image verifies on every boot; both
//! fields are checked because either alone could be replayed under a
//! compromised signing key.
//!
//! Layout (512 bytes):
//! ```text
//! Offset  Size   Field
//! 0x000   4      magic
//! 0x004   4      header size (code starts here)
//! 0x008   4      code size
//! 0x00C   4      version
//! 0x010   8      issue time (Unix seconds)
//! 0x018   32     image name, NUL-padded
//! 0x038   32     SHA-256 digest of the code segment
//! 0x058   64     ECDSA signature by the code authority over 0x000-0x058
//! 0x098   360    reserved
//! ```

use keel_common::constants::{IMAGE_HEADER_SIZE, IMAGE_NAME_SIZE, KEEL_MAGIC};
use keel_common::{Error, ImageKind, MemoryLayout, Result};
use keel_crypto::hash::{Sha256, Sha256Digest};
use keel_crypto::{constant_time_eq, ecdsa, EccPublicKey};
use keel_hal::FlashInterface;

use crate::regions::{self, Record};
use crate::store::ImageMeta;

/// The signed portion of an image header
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ImageHeaderContent {
    /// `KEEL_MAGIC`
    pub magic: u32,
    /// Header size; the code segment starts at header base + `hdr_size`
    pub hdr_size: u32,
    /// Code segment size in bytes
    pub size: u32,
    /// Image version (monotone per image)
    pub version: u32,
    /// Issue time in Unix seconds (monotone per image)
    pub issue_time: u64,
    /// Image name, NUL-padded
    pub name: [u8; IMAGE_NAME_SIZE],
    /// SHA-256 digest of the code segment
    pub digest: [u8; 32],
}

impl ImageHeaderContent {
    /// The byte range the code-authority signature covers
    #[must_use]
    pub fn signed_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

/// An image header record
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ImageHeader {
    /// Signed content
    pub content: ImageHeaderContent,
    /// ECDSA signature by the code authority over `content`
    pub signature: [u8; 64],
    /// Reserved up to the page boundary
    pub reserved: [u8; 360],
}

impl ImageHeader {
    /// An all-zero header, for staged construction
    #[must_use]
    pub fn zeroed() -> Self {
        regions::filled(0)
    }

    /// The raw record bytes, for image writers
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        regions::bytes_of(self)
    }
}

// SAFETY: repr(C), integers and byte arrays only, no implicit padding
// (sizes asserted below).
unsafe impl Record for ImageHeaderContent {}
// SAFETY: as above.
unsafe impl Record for ImageHeader {}

const _: () = assert!(core::mem::size_of::<ImageHeaderContent>() == 88);
const _: () = assert!(core::mem::size_of::<ImageHeader>() == IMAGE_HEADER_SIZE);

/// Read the header of an image region
pub fn read_header<F: FlashInterface>(flash: &F, base: u32) -> Result<ImageHeader> {
    regions::read_record(flash, base)
}

/// Verify the image in `kind`'s region against its header and metadata
///
/// On success returns the verified code digest — the measurement the
/// AliasID binds.
///
/// # Errors
///
/// `NotProvisioned` (header or metadata lacks magic), `InvalidInput`
/// (code placement or bounds), `BadDigest`, `BadSignature` or
/// `Rollback`, in check order.
pub fn verify_image<F: FlashInterface>(
    flash: &F,
    layout: &MemoryLayout,
    kind: ImageKind,
    meta: &ImageMeta,
    code_authority: &EccPublicKey,
) -> Result<Sha256Digest> {
    let base = layout.image_base(kind);
    let header = read_header(flash, base)?;
    let content = &header.content;

    if content.magic != KEEL_MAGIC {
        return Err(Error::NotProvisioned);
    }

    // The code segment must sit directly behind the header and fit the
    // region.
    if content.hdr_size as usize != IMAGE_HEADER_SIZE {
        return Err(Error::InvalidInput);
    }
    let region = layout.image_region_size(kind);
    let end = u64::from(content.hdr_size) + u64::from(content.size);
    if content.size == 0 || end > u64::from(region) {
        return Err(Error::InvalidInput);
    }

    let digest = digest_code(flash, base + content.hdr_size, content.size)?;
    if !constant_time_eq(&digest, &content.digest) {
        return Err(Error::BadDigest);
    }

    ecdsa::verify(code_authority, content.signed_bytes(), &header.signature)
        .map_err(|_| Error::BadSignature)?;

    if meta.magic != KEEL_MAGIC {
        return Err(Error::NotProvisioned);
    }
    if content.version < meta.last_version || content.issue_time < meta.last_issue_time {
        return Err(Error::Rollback);
    }

    Ok(digest)
}

fn digest_code<F: FlashInterface>(flash: &F, addr: u32, size: u32) -> Result<Sha256Digest> {
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
    use keel_crypto::{CryptoError, CryptoRng, EccKeypair};
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

    fn code_authority() -> EccKeypair {
        derive_keypair(b"code authority seed").unwrap()
    }

    fn write_image(
        flash: &mut SimFlash<{ testutil::FLASH_SIZE }>,
        base: u32,
        code: &[u8],
        version: u32,
        issue_time: u64,
        signer: &EccKeypair,
    ) {
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
            ecdsa::sign(signer, header.content.signed_bytes(), &mut TestRng(7)).unwrap();

        flash.write(base, header.as_bytes()).unwrap();
        flash.write(base + IMAGE_HEADER_SIZE as u32, code).unwrap();
    }

    fn seeded_meta(version: u32, issue_time: u64) -> ImageMeta {
        ImageMeta {
            magic: KEEL_MAGIC,
            last_version: version,
            last_issue_time: issue_time,
        }
    }

    #[test]
    fn valid_image_verifies_and_returns_its_digest() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        let code = [0xA5u8; 600];
        write_image(&mut flash, layout.app_base, &code, 2, 1000, &signer);

        let digest = verify_image(
            &flash,
            &layout,
            ImageKind::App,
            &seeded_meta(2, 1000),
            &signer.public(),
        )
        .unwrap();
        assert_eq!(digest, sha256(&code));
    }

    #[test]
    fn erased_region_is_not_provisioned() {
        let layout = testutil::layout();
        let flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        assert_eq!(
            verify_image(
                &flash,
                &layout,
                ImageKind::App,
                &seeded_meta(1, 1),
                &code_authority().public(),
            )
            .unwrap_err(),
            Error::NotProvisioned
        );
    }

    #[test]
    fn corrupted_code_fails_the_digest() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        write_image(&mut flash, layout.app_base, &[0xA5; 600], 2, 1000, &signer);
        flash
            .write(layout.app_base + IMAGE_HEADER_SIZE as u32 + 17, &[0x00])
            .unwrap();

        assert_eq!(
            verify_image(
                &flash,
                &layout,
                ImageKind::App,
                &seeded_meta(2, 1000),
                &signer.public(),
            )
            .unwrap_err(),
            Error::BadDigest
        );
    }

    #[test]
    fn rollback_on_version_is_rejected() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        write_image(&mut flash, layout.app_base, &[0xA5; 64], 1, 2000, &signer);

        assert_eq!(
            verify_image(
                &flash,
                &layout,
                ImageKind::App,
                &seeded_meta(2, 1000),
                &signer.public(),
            )
            .unwrap_err(),
            Error::Rollback
        );
    }

    #[test]
    fn rollback_on_issue_time_is_rejected() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        write_image(&mut flash, layout.app_base, &[0xA5; 64], 3, 500, &signer);

        assert_eq!(
            verify_image(
                &flash,
                &layout,
                ImageKind::App,
                &seeded_meta(2, 1000),
                &signer.public(),
            )
            .unwrap_err(),
            Error::Rollback
        );
    }

    #[test]
    fn equal_version_and_time_verify() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        write_image(&mut flash, layout.app_base, &[0xA5; 64], 2, 1000, &signer);

        assert!(verify_image(
            &flash,
            &layout,
            ImageKind::App,
            &seeded_meta(2, 1000),
            &signer.public(),
        )
        .is_ok());
    }

    #[test]
    fn foreign_signer_is_rejected() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let impostor = derive_keypair(b"not the code authority").unwrap();
        write_image(&mut flash, layout.app_base, &[0xA5; 64], 2, 1000, &impostor);

        assert_eq!(
            verify_image(
                &flash,
                &layout,
                ImageKind::App,
                &seeded_meta(2, 1000),
                &code_authority().public(),
            )
            .unwrap_err(),
            Error::BadSignature
        );
    }

    #[test]
    fn unseeded_metadata_is_not_provisioned() {
        let layout = testutil::layout();
        let mut flash = SimFlash::<{ testutil::FLASH_SIZE }>::new(0);
        let signer = code_authority();
        write_image(&mut flash, layout.app_base, &[0xA5; 64], 2, 1000, &signer);

        let unseeded = ImageMeta {
            magic: 0xFFFF_FFFF,
            last_version: 0,
            last_issue_time: 0,
        };
        assert_eq!(
            verify_image(&flash, &layout, ImageKind::App, &unseeded, &signer.public())
                .unwrap_err(),
            Error::NotProvisioned
        );
    }
}
