//! Module table locator: read-only traversal of a loaded module's export and
//! import directories.
//!
//! All RVA arithmetic and raw header dereferencing happens here; callers get
//! back resolved slot records and never see offsets. The one write the engine
//! performs goes through [`crate::patch::patch_slot`], not this module.

use std::ffi::{CStr, c_void};

use log::{debug, warn};

use crate::pe::{
    DosHeader, EXPORT_DIRECTORY_INDEX, ExportDirectory, IMPORT_DIRECTORY_INDEX, ImportByName,
    ImportDescriptor, MAX_EXPORT_NAMES, NT_SIGNATURE, NtHeaders, ORDINAL_FLAG,
};

/// A writable table cell together with the original function address read
/// from it at resolution time.
pub(crate) struct ResolvedSlot {
    /// Address of the cell that call sites or the loader dereference.
    pub slot: *mut c_void,
    /// Absolute entry address the cell currently resolves to.
    pub function: *const c_void,
}

/// A loaded module's mapped image, validated down to the NT signature.
pub(crate) struct ModuleImage {
    base: *const u8,
}

impl ModuleImage {
    /// # Safety
    /// `base` must be the base address of a module mapped in this process (or
    /// a buffer laid out like one) that stays mapped for the lifetime of the
    /// returned value and of every slot resolved from it.
    pub unsafe fn from_base(base: *const c_void) -> Option<Self> {
        if base.is_null() {
            return None;
        }
        let image = ModuleImage {
            base: base as *const u8,
        };
        let dos = unsafe { &*(image.base as *const DosHeader) };
        let nt_offset = dos.nt_offset()?;
        let nt = unsafe { &*(image.base.add(nt_offset) as *const NtHeaders) };
        if nt.signature != NT_SIGNATURE {
            return None;
        }
        Some(image)
    }

    pub fn base(&self) -> *const c_void {
        self.base as *const c_void
    }

    /// Translates an RVA into a pointer inside the mapped image.
    unsafe fn at<T>(&self, rva: u32) -> *const T {
        unsafe { self.base.add(rva as usize) as *const T }
    }

    unsafe fn name_at(&self, rva: u32) -> &CStr {
        unsafe { CStr::from_ptr(self.at::<core::ffi::c_char>(rva)) }
    }

    fn directory(&self, index: usize) -> Option<crate::pe::DataDirectory> {
        // SAFETY: headers were validated in `from_base` and the image stays
        // mapped per that constructor's contract.
        let nt = unsafe {
            let dos = &*(self.base as *const DosHeader);
            &*(self.base.add(dos.e_lfanew as usize) as *const NtHeaders)
        };
        if index >= nt.optional_header.number_of_rva_and_sizes as usize {
            return None;
        }
        let dir = nt.optional_header.data_directory[index];
        dir.is_present().then_some(dir)
    }

    /// Walks the export name array for a case-sensitive match of `func`.
    ///
    /// The returned slot is the function-RVA cell for the matched ordinal;
    /// `function` is the module base plus the stored RVA. Forwarded exports
    /// (RVA pointing back inside the export directory) name another module's
    /// code and cannot be patched at the table level, so they resolve to
    /// nothing. Ordinal-only exports never appear in the name array and are
    /// likewise out of reach.
    pub unsafe fn find_export(&self, func: &str) -> Option<ResolvedSlot> {
        let dir = self.directory(EXPORT_DIRECTORY_INDEX)?;
        let exports = unsafe { &*self.at::<ExportDirectory>(dir.virtual_address) };

        let name_count = exports.number_of_names as usize;
        if name_count > MAX_EXPORT_NAMES {
            warn!("export directory declares {name_count} names, refusing to walk it");
            return None;
        }

        let names = unsafe { self.at::<u32>(exports.address_of_names) };
        let ordinals = unsafe { self.at::<u16>(exports.address_of_name_ordinals) };
        let functions = unsafe { self.at::<u32>(exports.address_of_functions).cast_mut() };

        for i in 0..name_count {
            let name = unsafe { self.name_at(*names.add(i)) };
            if name.to_bytes() != func.as_bytes() {
                continue;
            }

            let ordinal = unsafe { *ordinals.add(i) } as usize;
            if ordinal >= exports.number_of_functions as usize {
                warn!("ordinal {ordinal} of {func} is outside the function array");
                return None;
            }

            let slot = unsafe { functions.add(ordinal) };
            let rva = unsafe { *slot };
            if rva >= dir.virtual_address && rva < dir.virtual_address + dir.size {
                debug!("{func} is a forwarded export, not patchable in place");
                return None;
            }

            return Some(ResolvedSlot {
                slot: slot as *mut c_void,
                function: unsafe { self.base.add(rva as usize) } as *const c_void,
            });
        }

        None
    }

    /// Walks this image's import descriptors for `dll`, then that descriptor's
    /// by-name thunks for `func`.
    ///
    /// The returned slot is the bound import-address-table cell itself, and
    /// `function` is the absolute address the loader already wrote there.
    /// Only the first descriptor matching `dll` is considered; ordinal-only
    /// imports carry no name and are skipped.
    pub unsafe fn find_import(&self, dll: &str, func: &str) -> Option<ResolvedSlot> {
        let dir = self.directory(IMPORT_DIRECTORY_INDEX)?;
        let mut descriptor = unsafe { self.at::<ImportDescriptor>(dir.virtual_address) };

        loop {
            let entry = unsafe { &*descriptor };
            if entry.is_null() {
                return None;
            }

            let module = unsafe { self.name_at(entry.name) };
            if module_names_equal(module.to_bytes(), dll) {
                // Prefer the original thunks: they keep name information even
                // after the loader rebinds the first-thunk array.
                let lookup_rva = if entry.original_first_thunk != 0 {
                    entry.original_first_thunk
                } else {
                    entry.first_thunk
                };
                let lookups = unsafe { self.at::<usize>(lookup_rva) };
                let bound = unsafe { self.at::<usize>(entry.first_thunk).cast_mut() };

                let mut i = 0;
                loop {
                    let lookup = unsafe { *lookups.add(i) };
                    if lookup == 0 {
                        return None;
                    }
                    if lookup & ORDINAL_FLAG == 0 {
                        let by_name = unsafe { &*self.at::<ImportByName>(lookup as u32) };
                        let name =
                            unsafe { CStr::from_ptr(by_name.name.as_ptr() as *const core::ffi::c_char) };
                        if name.to_bytes() == func.as_bytes() {
                            let slot = unsafe { bound.add(i) };
                            return Some(ResolvedSlot {
                                slot: slot as *mut c_void,
                                function: unsafe { *slot } as *const c_void,
                            });
                        }
                    }
                    i += 1;
                }
            }

            descriptor = unsafe { descriptor.add(1) };
        }
    }
}

/// ASCII case-insensitive module name comparison, length checked first.
fn module_names_equal(stored: &[u8], requested: &str) -> bool {
    stored.len() == requested.len() && stored.eq_ignore_ascii_case(requested.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testimage::{self, TestImage};

    #[test]
    fn rejects_buffers_without_signatures() {
        let zeroed = [0u64; 0x100];
        let image = unsafe { ModuleImage::from_base(zeroed.as_ptr() as *const c_void) };
        assert!(image.is_none());
    }

    #[test]
    fn resolves_known_export() {
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        let resolved = unsafe { image.find_export(testimage::EXPORT_NAME) }.unwrap();
        assert_eq!(resolved.slot as *mut u32, test.export_slot());
        assert_eq!(
            resolved.function as usize,
            test.base() as usize + testimage::EXPORT_FUNC_RVA as usize
        );
    }

    #[test]
    fn absent_export_name_resolves_to_nothing() {
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        assert!(unsafe { image.find_export("no_such_function") }.is_none());
    }

    #[test]
    fn forwarded_export_is_refused() {
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        assert!(unsafe { image.find_export(testimage::FORWARDED_NAME) }.is_none());
    }

    #[test]
    fn resolves_import_through_bound_slot() {
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        let resolved =
            unsafe { image.find_import(testimage::IMPORT_DLL, testimage::IMPORT_NAME) }.unwrap();
        assert_eq!(resolved.slot as *mut usize, test.import_slot());
        assert_eq!(resolved.function as usize, testimage::IMPORT_BOUND_VALUE);
    }

    #[test]
    fn import_module_match_is_case_insensitive() {
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        assert!(unsafe { image.find_import("SaMpLe.DlL", testimage::IMPORT_NAME) }.is_some());
        assert!(unsafe { image.find_import("other.dll", testimage::IMPORT_NAME) }.is_none());
    }

    #[test]
    fn absent_import_name_resolves_to_nothing() {
        // The descriptor also carries an ordinal-only thunk; asking for a name
        // must skip it without misreading it as a hint/name entry.
        let test = TestImage::new();
        let image = unsafe { ModuleImage::from_base(test.base()) }.unwrap();

        assert!(unsafe { image.find_import(testimage::IMPORT_DLL, "no_such_import") }.is_none());
    }
}
