//! `Symbol` and `Hook`: one interception point over a module's binary tables.

use std::ffi::{CString, c_void};
use std::ops::BitOr;
use std::ptr;

use log::{debug, warn};
use shared::errors::HookError;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetModuleHandleA, LoadLibraryA};
use windows::core::PCSTR;

use crate::image::ModuleImage;
use crate::patch::patch_slot;

/// Flag set selecting which tables a hook installs into.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HookTables(u32);

impl HookTables {
    /// Patch the owning module's export directory. Affects every caller that
    /// resolves the symbol after the patch, process-wide.
    pub const EXPORT: Self = Self(1);
    /// Patch the running executable's import address table. Affects only the
    /// executable's own statically bound calls.
    pub const IMPORT: Self = Self(2);
    /// Try both tables; each half succeeds or fails independently.
    pub const ALL: Self = Self(1 | 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HookTables {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One resolved function reference inside a module's binary tables.
pub struct Symbol {
    /// Original entry address captured at resolution time; never mutated.
    function: *const c_void,
    /// The writable cell call sites dereference. Null means this record is
    /// inactive for its table kind and every patch through it reports `false`.
    slot: *mut c_void,
    /// Relocation base for the cell's stored value: the owning module's base
    /// for export cells (RVA encoding), null for import cells (absolute).
    module_base: *const c_void,
}

impl Symbol {
    const fn inactive() -> Self {
        Symbol {
            function: ptr::null(),
            slot: ptr::null_mut(),
            module_base: ptr::null(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.slot.is_null()
    }

    /// Original entry address, or null for an inactive record.
    pub fn function(&self) -> *const c_void {
        self.function
    }

    /// Rewrites the cell to `new_func`; a no-op reporting `false` when the
    /// record is inactive.
    ///
    /// # Safety
    /// `new_func` must have the ABI callers of the hooked symbol expect, and
    /// the owning module must still be mapped.
    pub unsafe fn set(&self, new_func: *const c_void) -> bool {
        unsafe { patch_slot(self.slot, new_func, self.module_base) }
    }
}

// SAFETY: a Symbol is a read-only snapshot of addresses into images that stay
// mapped for the process lifetime; it owns nothing.
unsafe impl Send for Symbol {}
unsafe impl Sync for Symbol {}

/// An interception point: the export-side and import-side symbol for one
/// logical function, each independently hookable.
pub struct Hook {
    export_symbol: Symbol,
    import_symbol: Symbol,
}

impl Hook {
    /// Resolves `func` against `dll`'s export table and/or the running
    /// executable's import table and patches every requested, resolvable half
    /// to `new_func`. Halves fail independently; check the symbols (or the
    /// re-arm results) before relying on either being live.
    ///
    /// With `always_load` unset the export half binds only to a module that is
    /// already resident, so constructing a hook never drags a library into the
    /// process as a side effect.
    ///
    /// # Safety
    /// `new_func` must match the hooked function's ABI. Installation mutates
    /// process-wide tables; concurrent installs on the same symbol must be
    /// serialized by the caller.
    pub unsafe fn install(
        dll: &str,
        func: &str,
        new_func: *const c_void,
        always_load: bool,
        tables: HookTables,
    ) -> Self {
        let mut hook = Hook {
            export_symbol: Symbol::inactive(),
            import_symbol: Symbol::inactive(),
        };

        if tables.contains(HookTables::EXPORT) {
            hook.export_symbol = unsafe { resolve_export(dll, func, always_load) };
            if hook.export_symbol.is_active() && !unsafe { hook.set_export_hook(new_func) } {
                warn!("export patch of {dll}!{func} failed");
            }
        }

        if tables.contains(HookTables::IMPORT) {
            hook.import_symbol = unsafe { resolve_import(dll, func) };
            if hook.import_symbol.is_active() && !unsafe { hook.set_import_hook(new_func) } {
                warn!("import patch of {dll}!{func} failed");
            }
        }

        hook
    }

    /// Re-patches the export cell. Passing the captured original reverses the
    /// hook; passing anything else redirects it again.
    ///
    /// # Safety
    /// Same contract as [`Symbol::set`].
    pub unsafe fn set_export_hook(&self, new_func: *const c_void) -> bool {
        unsafe { self.export_symbol.set(new_func) }
    }

    /// Re-patches the import cell; see [`Hook::set_export_hook`].
    ///
    /// # Safety
    /// Same contract as [`Symbol::set`].
    pub unsafe fn set_import_hook(&self, new_func: *const c_void) -> bool {
        unsafe { self.import_symbol.set(new_func) }
    }

    pub fn export_symbol(&self) -> &Symbol {
        &self.export_symbol
    }

    pub fn import_symbol(&self) -> &Symbol {
        &self.import_symbol
    }

    /// Captured original entry address, preferring the export-side snapshot;
    /// null when neither table resolved.
    pub fn original(&self) -> *const c_void {
        if self.export_symbol.is_active() {
            self.export_symbol.function()
        } else {
            self.import_symbol.function()
        }
    }
}

/// Resolves or loads the module backing the export half.
fn module_handle(dll: &str, always_load: bool) -> Option<HMODULE> {
    let Ok(name) = CString::new(dll) else {
        debug!(
            "{}",
            HookError::ModuleUnavailable {
                name: dll.to_owned()
            }
        );
        return None;
    };
    let name = PCSTR(name.as_ptr() as *const u8);

    // Loading inside DllMain is miserable; only do it when asked to.
    let handle = if always_load {
        unsafe { LoadLibraryA(name) }
    } else {
        unsafe { GetModuleHandleA(name) }
    };

    match handle {
        Ok(handle) if !handle.is_invalid() => Some(handle),
        _ => {
            debug!(
                "{}",
                HookError::ModuleUnavailable {
                    name: dll.to_owned()
                }
            );
            None
        }
    }
}

unsafe fn resolve_export(dll: &str, func: &str, always_load: bool) -> Symbol {
    let Some(handle) = module_handle(dll, always_load) else {
        return Symbol::inactive();
    };
    let base = handle.0 as *const c_void;
    let Some(image) = (unsafe { ModuleImage::from_base(base) }) else {
        return Symbol::inactive();
    };

    match unsafe { image.find_export(func) } {
        Some(resolved) => Symbol {
            function: resolved.function,
            slot: resolved.slot,
            module_base: base,
        },
        None => {
            debug!(
                "{}",
                HookError::SymbolNotFound {
                    table: "export",
                    module: dll.to_owned(),
                    function: func.to_owned(),
                }
            );
            Symbol::inactive()
        }
    }
}

/// The import half always operates on the running executable's own image, the
/// only import table reachable without parsing another module.
unsafe fn resolve_import(dll: &str, func: &str) -> Symbol {
    let Ok(executable) = (unsafe { GetModuleHandleA(PCSTR::null()) }) else {
        return Symbol::inactive();
    };
    let Some(image) = (unsafe { ModuleImage::from_base(executable.0 as *const c_void) }) else {
        return Symbol::inactive();
    };

    match unsafe { image.find_import(dll, func) } {
        Some(resolved) => Symbol {
            function: resolved.function,
            slot: resolved.slot,
            // Import cells hold absolute addresses; no relocation base.
            module_base: ptr::null(),
        },
        None => {
            debug!(
                "{}",
                HookError::SymbolNotFound {
                    table: "import",
                    module: dll.to_owned(),
                    function: func.to_owned(),
                }
            );
            Symbol::inactive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::System::LibraryLoader::GetProcAddress;
    use windows::core::s;

    extern "system" fn dummy_detour() {}

    #[test]
    fn table_flags_compose() {
        assert!(HookTables::ALL.contains(HookTables::EXPORT));
        assert!(HookTables::ALL.contains(HookTables::IMPORT));
        assert!(!HookTables::EXPORT.contains(HookTables::IMPORT));
        assert_eq!(HookTables::EXPORT | HookTables::IMPORT, HookTables::ALL);
    }

    #[test]
    fn export_resolution_matches_platform_lookup() {
        // ntdll's stubs are plain exports (no forwarders), so the locator and
        // GetProcAddress must agree exactly.
        let symbol = unsafe { resolve_export("ntdll.dll", "NtClose", false) };
        assert!(symbol.is_active());

        let module = unsafe { GetModuleHandleA(s!("ntdll.dll")) }.unwrap();
        let direct = unsafe { GetProcAddress(module, s!("NtClose")) }.unwrap();
        assert_eq!(symbol.function() as usize, direct as usize);
    }

    #[test]
    fn absent_symbol_leaves_both_halves_inactive() {
        let hook = unsafe {
            Hook::install(
                "ntdll.dll",
                "DefinitelyNotAnExport",
                dummy_detour as *const c_void,
                false,
                HookTables::ALL,
            )
        };

        assert!(!hook.export_symbol().is_active());
        assert!(!hook.import_symbol().is_active());
        assert!(hook.original().is_null());
        // Re-arming an inactive hook stays a reported no-op.
        assert!(!unsafe { hook.set_export_hook(dummy_detour as *const c_void) });
        assert!(!unsafe { hook.set_import_hook(dummy_detour as *const c_void) });
    }

    #[test]
    fn missing_module_is_not_loaded_implicitly() {
        let symbol = unsafe { resolve_export("grapnel_no_such_module.dll", "anything", false) };
        assert!(!symbol.is_active());
        assert!(symbol.function().is_null());
    }
}
