// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Flash record I/O
//!
//! Persistent structures are fixed-layout records. Reads pull the whole
//! record into a RAM value; callers validate the magic before trusting
//! any field. Writes rewrite the whole record in one flash operation,
//! so at page granularity a torn write leaves either the old or the new
//! bytes — never a structurally new shape.
//!
//! Record types opt in through the [`Record`] marker, which asserts the
//! layout contract the byte casts rely on.

use core::mem::{size_of, MaybeUninit};

use keel_common::Result;
use keel_hal::FlashInterface;

/// Marker for flash/RAM record types
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with no implicit padding and no
/// bit patterns that are invalid for any field (integers and byte
/// arrays only). Both byte views below depend on this.
pub unsafe trait Record: Sized {}

/// The raw bytes of a record
pub fn bytes_of<T: Record>(value: &T) -> &[u8] {
    // SAFETY: `T: Record` guarantees a padding-free repr(C) layout, so
    // every byte of the value is initialized and the slice covers
    // exactly the record.
    unsafe { core::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) }
}

/// Build a record with every byte set to `fill`
pub(crate) fn filled<T: Record>(fill: u8) -> T {
    let mut value = MaybeUninit::<T>::uninit();
    // SAFETY: the write covers the whole value; `T: Record` guarantees
    // any bit pattern is a valid `T`, so assume_init is sound.
    unsafe {
        core::ptr::write_bytes(value.as_mut_ptr().cast::<u8>(), fill, size_of::<T>());
        value.assume_init()
    }
}

/// Read a whole record from flash into a RAM value
pub(crate) fn read_record<T: Record, F: FlashInterface>(flash: &F, address: u32) -> Result<T> {
    let mut value = MaybeUninit::<T>::uninit();
    // SAFETY: the slice spans exactly the uninitialized value, which
    // `flash.read` fills completely before assume_init; `T: Record`
    // makes every resulting bit pattern valid.
    unsafe {
        let buf =
            core::slice::from_raw_parts_mut(value.as_mut_ptr().cast::<u8>(), size_of::<T>());
        flash.read(address, buf)?;
        Ok(value.assume_init())
    }
}

/// Write a whole record to flash in one operation
pub(crate) fn write_record<T: Record, F: FlashInterface>(
    flash: &mut F,
    address: u32,
    value: &T,
) -> Result<()> {
    flash.write(address, bytes_of(value))?;
    Ok(())
}
