//! End-to-end checks of the injection session against live processes.

use injector::remote::{InjectionSession, Target};
use shared::errors::InjectError;

use windows_sys::Win32::System::LibraryLoader::GetModuleHandleA;

/// A benign system module no test process loads by default; remote-loading it
/// into ourselves is observable on the module list.
const BENIGN_PAYLOAD: &str = "dbghelp.dll";

#[test]
fn unreachable_pid_fails_before_any_allocation() {
    // Pid 0 is the idle process; opening it is always refused, so the session
    // never reaches the allocation step.
    let err = InjectionSession::acquire(&Target::Pid(0)).unwrap_err();
    assert!(matches!(err, InjectError::ProcessAcquisitionFailed { .. }));
}

#[test]
fn attach_mode_loads_payload_into_target() {
    // Attach to ourselves: the remote thread runs the loader in this very
    // process, so success is directly observable.
    let before = unsafe { GetModuleHandleA(c"dbghelp.dll".as_ptr() as *const u8) };
    assert!(before.is_null(), "payload must not be preloaded");

    let session = InjectionSession::acquire(&Target::Pid(std::process::id())).unwrap();
    session.run(BENIGN_PAYLOAD).unwrap();

    let after = unsafe { GetModuleHandleA(c"dbghelp.dll".as_ptr() as *const u8) };
    assert!(!after.is_null(), "payload should be on the module list");
}

#[test]
fn attach_mode_rejects_unloadable_payload() {
    let session = InjectionSession::acquire(&Target::Pid(std::process::id())).unwrap();
    let err = session.run("grapnel_no_such_payload.dll").unwrap_err();
    assert!(matches!(err, InjectError::PayloadLoadRejected));
}

#[test]
fn launch_mode_injects_before_resume() {
    // The child is suspended until the session resumes it, which happens only
    // after the load has been observed; /c exit makes it leave on its own.
    let target = Target::Launch {
        executable: "cmd.exe".to_owned(),
        working_directory: None,
        arguments: "/c exit".to_owned(),
    };

    let session = InjectionSession::acquire(&target).unwrap();
    session.run(BENIGN_PAYLOAD).unwrap();
}
