//! The wglGetProcAddress interception and the glBindFramebuffer far hook.
//!
//! glBindFramebuffer is only obtainable through wglGetProcAddress, so hooking
//! it takes two stages: a standard table hook on the lookup function, and a
//! far cell holding whatever pointer the real lookup returns. The proxy handed
//! to the application calls through the cell and then paints.

use std::ffi::{CStr, c_void};
use std::sync::Mutex;
use std::{mem, ptr};

use hook_engine::{FarHook, HookEntry, HookManager, HookTables};
use log::{error, warn};
use once_cell::sync::Lazy;
use windows::core::PCSTR;

// The handful of GL values this needs, declared locally rather than dragging
// in an extension loader.
const GL_READ_FRAMEBUFFER: u32 = 0x8CA8;
const GL_COLOR_BUFFER_BIT: u32 = 0x0000_4000;
const GL_COLOR_CLEAR_VALUE: u32 = 0x0C22;

#[link(name = "opengl32")]
unsafe extern "system" {
    fn glGetFloatv(pname: u32, params: *mut f32);
    fn glClearColor(red: f32, green: f32, blue: f32, alpha: f32);
    fn glClear(mask: u32);
}

static MANAGER: Lazy<Mutex<HookManager>> = Lazy::new(|| Mutex::new(HookManager::new()));

/// Original wglGetProcAddress, captured at install time.
static mut ORIG_WGL_GET_PROC_ADDRESS: *const c_void = ptr::null();

/// The real glBindFramebuffer lands here when the application looks it up.
static GL_BIND_FRAMEBUFFER: FarHook = FarHook::new();

type WglGetProcAddressFn = unsafe extern "system" fn(PCSTR) -> *const c_void;
type GlBindFramebufferFn = unsafe extern "system" fn(u32, u32);

pub fn install_all_hooks() {
    let mut manager = match MANAGER.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    manager.add(HookEntry {
        dll: "OPENGL32.DLL",
        func: "wglGetProcAddress",
        detour: wgl_get_proc_address_detour as *const c_void,
        orig_ptr: &raw mut ORIG_WGL_GET_PROC_ADDRESS,
        tables: HookTables::ALL,
        always_load: false,
    });
    manager.install_all();
}

pub fn uninstall_all_hooks() {
    let mut manager = match MANAGER.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    manager.uninstall_all();
}

/// Replacement for wglGetProcAddress: forwards to the original and swaps the
/// framebuffer-bind entry points for the proxy below.
unsafe extern "system" fn wgl_get_proc_address_detour(name: PCSTR) -> *const c_void {
    let captured = unsafe { ORIG_WGL_GET_PROC_ADDRESS };
    if captured.is_null() {
        // Reachable only if a caller raced installation; answer nothing
        // rather than recurse through the patched table.
        error!("wglGetProcAddress detour entered before install completed");
        return ptr::null();
    }
    let base: WglGetProcAddressFn = unsafe { mem::transmute(captured) };
    let proc = unsafe { base(name) };

    // No current context, or the entry point is unsupported.
    if proc.is_null() || name.is_null() {
        return proc;
    }

    // EXT and core share a signature, so one proxy covers both names.
    let requested = unsafe { CStr::from_ptr(name.0 as *const core::ffi::c_char) }.to_bytes();
    if requested == "glBindFramebuffer".as_bytes() || requested == "glBindFramebufferEXT".as_bytes()
    {
        GL_BIND_FRAMEBUFFER.define(proc);
        return gl_bind_framebuffer_proxy as *const c_void;
    }

    proc
}

/// Proxy handed out in place of glBindFramebuffer: binds, then clears draw
/// targets to opaque red. The clear color is saved and put back so GL state
/// is left untouched; hooking glClearColor and replaying its last arguments
/// would avoid the round trip.
unsafe extern "system" fn gl_bind_framebuffer_proxy(target: u32, framebuffer: u32) {
    let Some(captured) = GL_BIND_FRAMEBUFFER.get() else {
        // The application got the proxy from a lookup, so the cell should be
        // populated; refuse to guess if it is not.
        warn!("glBindFramebuffer proxy invoked before its lookup defined it");
        return;
    };
    let base: GlBindFramebufferFn = unsafe { mem::transmute(captured.as_ptr()) };
    unsafe { base(target, framebuffer) };

    if target != GL_READ_FRAMEBUFFER {
        unsafe {
            let mut previous = [0.0f32; 4];
            glGetFloatv(GL_COLOR_CLEAR_VALUE, previous.as_mut_ptr());

            glClearColor(1.0, 0.0, 0.0, 1.0);
            glClear(GL_COLOR_BUFFER_BIT);

            glClearColor(previous[0], previous[1], previous[2], previous[3]);
        }
    }
}
