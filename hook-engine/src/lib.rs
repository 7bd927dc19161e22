//! Export/import table hooking engine.
//!
//! Resolves a named function inside a loaded module's export directory or the
//! running executable's import address table, patches the resolved cell to a
//! replacement while page protection is briefly lifted, and keeps the original
//! entry address for call-through and later reversal. Far-hook cells cover
//! functions that only exist behind a runtime dynamic lookup and therefore
//! never appear in either table.

mod far;
mod hooks;
mod image;
mod manager;
mod patch;
mod pe;

pub use far::FarHook;
pub use hooks::{Hook, HookTables, Symbol};
pub use manager::{HookEntry, HookManager};
pub use patch::patch_slot;

#[cfg(test)]
mod testimage;
