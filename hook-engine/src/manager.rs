//! Hook registration: entries declared by a payload, installed in one pass.

use std::ffi::c_void;

use log::{error, info};

use crate::hooks::{Hook, HookTables};

/// A single hook specification:
/// 1. `dll`: the module owning the target function (e.g. `"OPENGL32.DLL"`).
/// 2. `func`: the exported name to intercept.
/// 3. `detour`: the replacement entry point, cast to a raw pointer.
/// 4. `orig_ptr`: where the captured original entry address is stored after
///    install, so the detour can call through to the base implementation.
#[derive(Clone, Copy)]
pub struct HookEntry {
    pub dll: &'static str,
    pub func: &'static str,
    pub detour: *const c_void,
    pub orig_ptr: *mut *const c_void,
    /// Which tables to patch.
    pub tables: HookTables,
    /// Load `dll` if it is not yet resident (export half only).
    pub always_load: bool,
}

// SAFETY: an entry is raw pointers and 'static strings describing statics; it
// owns nothing and carries no thread-bound state.
unsafe impl Send for HookEntry {}
unsafe impl Sync for HookEntry {}

/// Collects hook specifications and the live [`Hook`]s built from them.
///
/// Installation is ordered and single-threaded by design: a payload registers
/// its entries and calls [`install_all`] once, typically while it is being
/// loaded. Reversal is [`uninstall_all`], which re-arms every live hook with
/// its captured original.
///
/// [`install_all`]: HookManager::install_all
/// [`uninstall_all`]: HookManager::uninstall_all
pub struct HookManager {
    spec: Vec<HookEntry>,
    live: Vec<Hook>,
}

impl HookManager {
    pub fn new() -> Self {
        HookManager {
            spec: Vec::new(),
            live: Vec::new(),
        }
    }

    /// Adds a specification without installing it.
    pub fn add(&mut self, entry: HookEntry) {
        self.spec.push(entry);
    }

    /// Installs every registered entry in order. An entry that resolves in
    /// neither table is logged and skipped; the rest stay live for
    /// [`HookManager::uninstall_all`]. Returns how many entries armed at
    /// least one table.
    pub fn install_all(&mut self) -> usize {
        let mut armed = 0;
        for entry in &self.spec {
            // SAFETY: entries pair a detour with the function it replaces and
            // point `orig_ptr` at a 'static cell; see `HookEntry`.
            let hook = unsafe {
                Hook::install(
                    entry.dll,
                    entry.func,
                    entry.detour,
                    entry.always_load,
                    entry.tables,
                )
            };
            if hook.original().is_null() {
                error!("no table entry found for {}!{}", entry.dll, entry.func);
                continue;
            }

            unsafe { *entry.orig_ptr = hook.original() };
            info!("installed {}!{}", entry.dll, entry.func);
            self.live.push(hook);
            armed += 1;
        }
        armed
    }

    /// Re-arms every live hook with its captured original entry address and
    /// forgets it. Halves that never resolved stay no-ops.
    pub fn uninstall_all(&mut self) {
        for hook in &self.live {
            // SAFETY: the captured originals are the very values the cells
            // held before installation.
            unsafe {
                hook.set_export_hook(hook.export_symbol().function());
                hook.set_import_hook(hook.import_symbol().function());
            }
        }
        if !self.live.is_empty() {
            info!("restored {} hooks", self.live.len());
        }
        self.live.clear();
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}
