//! Demonstration payload: clears every bound draw framebuffer to solid red.
//!
//! Meant to be delivered by the injector; the hooking work happens as part of
//! being loaded, so no signal beyond the load itself is needed.

#![allow(non_snake_case)]

mod detours;

use windows::Win32::Foundation::{HINSTANCE, HMODULE};
use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

#[unsafe(no_mangle)]
pub extern "system" fn DllMain(hinst: HINSTANCE, reason: u32, _: *mut ()) -> bool {
    match reason {
        DLL_PROCESS_ATTACH => unsafe {
            // No per-thread notifications needed.
            DisableThreadLibraryCalls(HMODULE::from(hinst)).ok();

            // Install synchronously: the injector's wait covers this call and
            // a launched target's primary thread resumes only afterwards, so
            // the hooks must be armed before DllMain returns. Table patching
            // touches no loader-critical APIs, making that safe here.
            detours::install_all_hooks();
        },

        DLL_PROCESS_DETACH => {
            // On unload, put the captured originals back.
            detours::uninstall_all_hooks();
        }

        _ => {}
    }
    true
}
