//! Far hooks: interception cells for functions only reachable through a
//! runtime dynamic-lookup call.
//!
//! Such functions never appear in an export or import directory, so the table
//! locator cannot find them. Instead, the lookup function itself is hooked;
//! when the application asks for a targeted name, the real pointer lands in a
//! `FarHook` cell and the caller receives a proxy. The proxy calls through the
//! cell, which gives it the same call-the-original semantics a table hook has.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// A single function-pointer cell, unset until the dynamic lookup that
/// produces the real address has run.
///
/// `const`-constructible so proxies can reference it from a `static`. A proxy
/// invoked before the defining lookup must fail clearly, which is why [`get`]
/// returns `None` instead of a dangling pointer. Repeated lookups overwrite
/// the cell: the last resolution wins, matching what callers observe from the
/// lookup function itself.
///
/// [`get`]: FarHook::get
pub struct FarHook {
    cell: AtomicPtr<c_void>,
}

impl FarHook {
    pub const fn new() -> Self {
        FarHook {
            cell: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Stores the dynamically resolved entry address.
    pub fn define(&self, proc: *const c_void) {
        self.cell.store(proc.cast_mut(), Ordering::SeqCst);
    }

    pub fn is_defined(&self) -> bool {
        !self.cell.load(Ordering::SeqCst).is_null()
    }

    /// The stored entry address, or `None` before the defining lookup.
    pub fn get(&self) -> Option<NonNull<c_void>> {
        NonNull::new(self.cell.load(Ordering::SeqCst))
    }
}

impl Default for FarHook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "system" fn looked_up() {}
    extern "system" fn looked_up_again() {}

    #[test]
    fn undefined_cell_reports_clearly() {
        let cell = FarHook::new();
        assert!(!cell.is_defined());
        assert!(cell.get().is_none());
    }

    #[test]
    fn defined_cell_returns_stored_pointer() {
        let cell = FarHook::new();
        cell.define(looked_up as *const c_void);

        assert!(cell.is_defined());
        assert_eq!(cell.get().unwrap().as_ptr() as usize, looked_up as usize);
    }

    #[test]
    fn later_lookup_overwrites_earlier_one() {
        let cell = FarHook::new();
        cell.define(looked_up as *const c_void);
        cell.define(looked_up_again as *const c_void);

        assert_eq!(
            cell.get().unwrap().as_ptr() as usize,
            looked_up_again as usize
        );
    }
}
