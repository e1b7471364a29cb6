// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Fixed memory layout
//!
//! The physical map is a contract between the pre-boot stage, the core
//! and the next layer: the linker script of every stage places the same
//! regions at the same addresses. All engine code takes the layout as a
//! value; no address is hard-coded anywhere else.
//!
//! Regions:
//! ```text
//! core            image header + core code
//! core patcher    image header + patcher code
//! downloader      image header + downloader code
//! app             image header + application code
//! data store      trust anchors ‖ config data (persistent)
//! staging area    append-only log of signed tickets and updates
//! ```

use crate::constants::{DATA_STORE_SIZE, TRUST_ANCHORS_SIZE};
use crate::types::ImageKind;

/// The fixed flash map of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Base address of the data store (trust anchors, then config data)
    pub data_store_base: u32,
    /// Base address of the staging area
    pub staging_base: u32,
    /// Staging area size in bytes (a multiple of the flash page size)
    pub staging_size: u32,
    /// Base address of the core image region (header first)
    pub core_base: u32,
    /// Core image region size in bytes
    pub core_size: u32,
    /// Base address of the core patcher image region
    pub cpatcher_base: u32,
    /// Core patcher image region size in bytes
    pub cpatcher_size: u32,
    /// Base address of the update downloader image region
    pub downloader_base: u32,
    /// Update downloader image region size in bytes
    pub downloader_size: u32,
    /// Base address of the application image region
    pub app_base: u32,
    /// Application image region size in bytes
    pub app_size: u32,
}

impl MemoryLayout {
    /// Reference platform map (Cortex-M class part, 1 MB flash bank)
    pub const REFERENCE: Self = Self {
        core_base: 0x0800_0000,
        core_size: 0x0002_0000,
        cpatcher_base: 0x0802_0000,
        cpatcher_size: 0x0001_0000,
        downloader_base: 0x0803_0000,
        downloader_size: 0x0001_0000,
        app_base: 0x0804_0000,
        app_size: 0x0003_0000,
        data_store_base: 0x0807_0000,
        staging_base: 0x0807_1000,
        staging_size: 0x0000_4000,
    };

    /// Base address of the trust anchors record
    #[must_use]
    pub const fn trust_anchors_base(&self) -> u32 {
        self.data_store_base
    }

    /// Base address of the config data record
    #[must_use]
    pub const fn config_data_base(&self) -> u32 {
        self.data_store_base + TRUST_ANCHORS_SIZE as u32
    }

    /// Total data store size in bytes
    #[must_use]
    pub const fn data_store_size(&self) -> u32 {
        DATA_STORE_SIZE as u32
    }

    /// Base address of an image region (its header comes first)
    #[must_use]
    pub const fn image_base(&self, kind: ImageKind) -> u32 {
        match kind {
            ImageKind::Core => self.core_base,
            ImageKind::CorePatcher => self.cpatcher_base,
            ImageKind::Downloader => self.downloader_base,
            ImageKind::App => self.app_base,
        }
    }

    /// Size of an image region in bytes
    #[must_use]
    pub const fn image_region_size(&self, kind: ImageKind) -> u32 {
        match kind {
            ImageKind::Core => self.core_size,
            ImageKind::CorePatcher => self.cpatcher_size,
            ImageKind::Downloader => self.downloader_size,
            ImageKind::App => self.app_size,
        }
    }

    /// End address (exclusive) of the staging area
    #[must_use]
    pub const fn staging_end(&self) -> u32 {
        self.staging_base + self.staging_size
    }
}
