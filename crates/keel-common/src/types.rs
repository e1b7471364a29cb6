// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Common types for the Keelboot core
//!
//! The shared vocabulary of the boot path: which layer runs next, which
//! flash image a record refers to, and the fixed PEM buffer type used
//! by every structure carrying key material.

use core::fmt;

use crate::constants::PEM_BUF_SIZE;

/// Fixed-size buffer holding a NUL-terminated, zero-padded PEM document
pub type PemBuf = [u8; PEM_BUF_SIZE];

/// The layer the core hands control to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootMode {
    /// Core patcher: the only layer allowed to rewrite the core region
    CorePatcher = 0,
    /// Update downloader: fetches tickets and updates from the management service
    Downloader = 1,
    /// Application firmware
    App = 2,
}

impl BootMode {
    /// Get the boot mode name for trace output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CorePatcher => "core patcher",
            Self::Downloader => "update downloader",
            Self::App => "app",
        }
    }

    /// The flash image this mode boots into
    #[must_use]
    pub const fn image_kind(&self) -> ImageKind {
        match self {
            Self::CorePatcher => ImageKind::CorePatcher,
            Self::Downloader => ImageKind::Downloader,
            Self::App => ImageKind::App,
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four executable layers persisted in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageKind {
    /// The core itself (this code); rewritten only by the core patcher
    Core = 0,
    /// Core patcher image
    CorePatcher = 1,
    /// Update downloader image
    Downloader = 2,
    /// Application image
    App = 3,
}

impl ImageKind {
    /// Get the image name for trace output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::CorePatcher => "core patcher",
            Self::Downloader => "update downloader",
            Self::App => "app",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
