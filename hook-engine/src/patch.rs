//! Protected patcher: the single place that writes through a resolved slot.

use std::ffi::c_void;
use std::{mem, ptr};

use log::error;
use shared::errors::HookError;
use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, PAGE_READWRITE, VirtualProtect};

/// Rewrites one table cell while its page is temporarily writable.
///
/// With a non-null `reloc_base` the cell is a 32-bit export entry and receives
/// `new_value - reloc_base`; with a null `reloc_base` the cell is a
/// pointer-sized import entry and receives `new_value` unchanged. The page
/// protection captured before the write is restored afterwards; a failed
/// restore reports overall failure even though the value was written, and the
/// page is left writable (accepted residual risk).
///
/// Null `slot` or `new_value` reports `false` without touching anything, which
/// is how patches through an inactive [`crate::Symbol`] degrade into no-ops.
///
/// # Safety
/// `slot` must point to a live table cell of the width implied by
/// `reloc_base`, resolved from an image that stays mapped for the duration of
/// the call. No other thread may patch the same cell concurrently; threads
/// mid-call through the cell see either the old or the new value, pointer
/// writes being aligned.
pub unsafe fn patch_slot(
    slot: *mut c_void,
    new_value: *const c_void,
    reloc_base: *const c_void,
) -> bool {
    if slot.is_null() || new_value.is_null() {
        return false;
    }

    // Export cells store RVAs; values the cell cannot encode are rejected
    // before any protection change.
    let (width, encoded) = if !reloc_base.is_null() {
        match (new_value as usize).checked_sub(reloc_base as usize) {
            Some(rva) if rva <= u32::MAX as usize => (mem::size_of::<u32>(), rva),
            _ => {
                error!(
                    "{}",
                    HookError::RelocationOutOfRange {
                        value: new_value as usize,
                        base: reloc_base as usize,
                    }
                );
                return false;
            }
        }
    } else {
        (mem::size_of::<usize>(), new_value as usize)
    };

    let mut previous = PAGE_PROTECTION_FLAGS::default();
    if unsafe { VirtualProtect(slot as *const c_void, width, PAGE_READWRITE, &mut previous) }
        .is_err()
    {
        error!(
            "{}",
            HookError::ProtectionChangeFailed {
                address: slot as usize
            }
        );
        return false;
    }

    unsafe {
        if width == mem::size_of::<u32>() {
            ptr::write(slot as *mut u32, encoded as u32);
        } else {
            ptr::write(slot as *mut usize, encoded);
        }
    }

    let mut scratch = PAGE_PROTECTION_FLAGS::default();
    if unsafe { VirtualProtect(slot as *const c_void, width, previous, &mut scratch) }.is_err() {
        error!(
            "{}",
            HookError::ProtectionChangeFailed {
                address: slot as usize
            }
        );
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testimage::{IMPORT_BOUND_VALUE, TestImage};
    use windows::Win32::System::Memory::{MEMORY_BASIC_INFORMATION, VirtualQuery};

    fn protection_of(address: *const c_void) -> u32 {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let len = unsafe {
            VirtualQuery(
                Some(address),
                &mut info,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        assert_ne!(len, 0);
        info.Protect.0
    }

    #[test]
    fn rejects_null_slot_and_null_value() {
        let mut cell = 0usize;
        let cell_ptr = &mut cell as *mut usize as *mut c_void;

        assert!(!unsafe { patch_slot(ptr::null_mut(), cell_ptr, ptr::null()) });
        assert!(!unsafe { patch_slot(cell_ptr, ptr::null(), ptr::null()) });
        assert_eq!(cell, 0);
    }

    #[test]
    fn export_patch_writes_module_relative_value() {
        let test = TestImage::new();
        let base = test.base();
        let slot = test.export_slot();
        let candidate = unsafe { (base as *const u8).add(0x2000) } as *const c_void;

        assert!(unsafe { patch_slot(slot as *mut c_void, candidate, base) });
        assert_eq!(unsafe { *slot }, 0x2000);
    }

    #[test]
    fn export_patch_rejects_unencodable_candidate() {
        let test = TestImage::new();
        let slot = test.export_slot();
        let before = unsafe { *slot };

        // A candidate below the relocation base has no RVA representation.
        let below_base = 0x10usize as *const c_void;
        assert!(!unsafe { patch_slot(slot as *mut c_void, below_base, test.base()) });
        assert_eq!(unsafe { *slot }, before);
    }

    #[test]
    fn import_patch_writes_absolute_value_and_is_idempotent() {
        let test = TestImage::new();
        let slot = test.import_slot();
        let replacement = 0x00ab_cdefusize as *const c_void;

        assert!(unsafe { patch_slot(slot as *mut c_void, replacement, ptr::null()) });
        assert!(unsafe { patch_slot(slot as *mut c_void, replacement, ptr::null()) });
        assert_eq!(unsafe { *slot }, replacement as usize);
    }

    #[test]
    fn import_patch_reverses_to_captured_original() {
        let test = TestImage::new();
        let slot = test.import_slot();
        let original = unsafe { *slot } as *const c_void;
        let replacement = 0x00ab_cdefusize as *const c_void;

        assert!(unsafe { patch_slot(slot as *mut c_void, replacement, ptr::null()) });
        assert!(unsafe { patch_slot(slot as *mut c_void, original, ptr::null()) });
        assert_eq!(unsafe { *slot }, IMPORT_BOUND_VALUE);
    }

    #[test]
    fn protection_round_trips_across_a_patch() {
        let test = TestImage::new();
        let slot = test.import_slot() as *mut c_void;
        let before = protection_of(slot);

        assert!(unsafe { patch_slot(slot, 0x00ab_cdefusize as *const c_void, ptr::null()) });
        assert_eq!(protection_of(slot), before);
    }
}
