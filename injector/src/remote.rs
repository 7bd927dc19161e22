//! Remote injection session: allocate in the target, write the payload path,
//! force the load on a remote thread, clean up on every path.
//!
//! A session is strictly linear: acquire the target, then run one attempt.
//! Every failure is terminal for the run; already-acquired remote resources
//! are released best-effort, and a secondary release failure is logged without
//! changing the outcome being reported.

use std::ffi::{CString, c_void};
use std::{io, mem, ptr};

use log::{debug, error, info};
use shared::constants::{LOADER_MODULE, LOADER_PROC};
use shared::errors::InjectError;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
use windows_sys::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
};
use windows_sys::Win32::System::Threading::{
    CREATE_SUSPENDED, CreateProcessA, CreateRemoteThread, GetExitCodeThread, INFINITE,
    OpenProcess, PROCESS_CREATE_THREAD, PROCESS_INFORMATION, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE, ResumeThread, STARTUPINFOA,
    WaitForSingleObject,
};

/// Thread routine shape of the loader entry point.
type LoaderRoutine = unsafe extern "system" fn(*mut c_void) -> u32;

/// How the target process is acquired.
pub enum Target {
    /// Attach to a running process.
    Pid(u32),
    /// Launch the executable suspended and resume it after injection.
    Launch {
        executable: String,
        working_directory: Option<String>,
        arguments: String,
    },
}

/// RAII wrapper for a kernel handle. A failed close is logged and otherwise
/// ignored; it never overrides a primary outcome.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if unsafe { CloseHandle(self.0) } == 0 {
            debug!("CloseHandle failed: {}", io::Error::last_os_error());
        }
    }
}

/// One injection attempt against one acquired target.
///
/// Order matters on the way out: the remote buffer and the remote thread
/// handle are always released, and a launched target's primary thread resumes
/// only after the load completes, so the payload's hooks are armed before the
/// program executes its first instruction.
pub struct InjectionSession {
    process: OwnedHandle,
    pid: u32,
    /// Primary thread of a launched target, still suspended.
    suspended_thread: Option<OwnedHandle>,
}

impl InjectionSession {
    /// Acquires the target: launches it suspended if asked to, then opens the
    /// process with exactly the rights the rest of the session needs.
    pub fn acquire(target: &Target) -> Result<Self, InjectError> {
        let (pid, suspended_thread) = match target {
            Target::Pid(pid) => (*pid, None),
            Target::Launch {
                executable,
                working_directory,
                arguments,
            } => {
                let (pid, thread) =
                    launch_suspended(executable, working_directory.as_deref(), arguments)?;
                (pid, Some(thread))
            }
        };

        let handle = unsafe {
            OpenProcess(
                PROCESS_CREATE_THREAD
                    | PROCESS_QUERY_INFORMATION
                    | PROCESS_VM_OPERATION
                    | PROCESS_VM_WRITE
                    | PROCESS_VM_READ,
                0,
                pid,
            )
        };
        if handle.is_null() {
            return Err(InjectError::ProcessAcquisitionFailed {
                target: format!("pid {pid}"),
                source: io::Error::last_os_error(),
            });
        }

        info!("target acquired: pid {pid}");
        Ok(InjectionSession {
            process: OwnedHandle(handle),
            pid,
            suspended_thread,
        })
    }

    /// Runs the whole attempt: allocate, write, load, wait, clean up, and for
    /// a launched target, resume.
    pub fn run(mut self, payload_path: &str) -> Result<(), InjectError> {
        let path = CString::new(payload_path)
            .map_err(|_| InjectError::MalformedArgument(format!("payload path '{payload_path}'")))?;
        let bytes = path.as_bytes_with_nul();

        // Remote buffer sized exactly to the path string.
        let remote = unsafe {
            VirtualAllocEx(
                self.process.0,
                ptr::null(),
                bytes.len(),
                MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if remote.is_null() {
            return Err(InjectError::RemoteMemoryFailed {
                op: "allocation",
                source: io::Error::last_os_error(),
            });
        }
        debug!("allocated {} bytes in pid {}", bytes.len(), self.pid);

        let written = unsafe {
            WriteProcessMemory(
                self.process.0,
                remote,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                ptr::null_mut(),
            )
        };
        if written == 0 {
            let source = io::Error::last_os_error();
            self.free_remote(remote);
            return Err(InjectError::RemoteMemoryFailed {
                op: "write",
                source,
            });
        }

        // The loader entry point sits at the same address in the target, so a
        // locally resolved pointer is a valid remote start routine.
        let loader = match loader_entry_point() {
            Ok(loader) => loader,
            Err(source) => {
                self.free_remote(remote);
                return Err(InjectError::RemoteThreadFailed { source });
            }
        };
        let thread = unsafe {
            CreateRemoteThread(
                self.process.0,
                ptr::null(),
                0,
                Some(loader),
                remote,
                0,
                ptr::null_mut(),
            )
        };
        if thread.is_null() {
            let source = io::Error::last_os_error();
            self.free_remote(remote);
            return Err(InjectError::RemoteThreadFailed { source });
        }
        let thread = OwnedHandle(thread);
        debug!("remote loader thread running in pid {}", self.pid);

        // Unbounded wait, then the loader's verdict from the exit code.
        let mut exit_code = 0u32;
        let verdict = unsafe {
            if WaitForSingleObject(thread.0, INFINITE) == WAIT_FAILED {
                Err(io::Error::last_os_error())
            } else if GetExitCodeThread(thread.0, &mut exit_code) == 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(exit_code)
            }
        };

        // The buffer and thread handle go away regardless of the verdict.
        self.free_remote(remote);
        drop(thread);

        // A launched target starts running only now, hooks already armed.
        if let Some(primary) = self.suspended_thread.take() {
            if unsafe { ResumeThread(primary.0) } == u32::MAX {
                error!("could not resume target: {}", io::Error::last_os_error());
            }
        }

        match verdict {
            Ok(code) if code != 0 => Ok(()),
            Ok(_) => Err(InjectError::PayloadLoadRejected),
            Err(source) => Err(InjectError::RemoteThreadFailed { source }),
        }
    }

    /// Best-effort release of the remote buffer. A failure here is reported
    /// but never overrides the outcome already being propagated.
    fn free_remote(&self, address: *mut c_void) {
        if unsafe { VirtualFreeEx(self.process.0, address, 0, MEM_RELEASE) } == 0 {
            error!(
                "could not free remote memory in pid {}: {}",
                self.pid,
                io::Error::last_os_error()
            );
        }
    }
}

/// Starts `executable` suspended, returning its pid and primary thread.
///
/// The command line is the classic `<application> <arguments>` buffer; it has
/// to be mutable because CreateProcessA may rewrite it in place.
fn launch_suspended(
    executable: &str,
    working_directory: Option<&str>,
    arguments: &str,
) -> Result<(u32, OwnedHandle), InjectError> {
    let invalid = |what: &str| InjectError::ProcessAcquisitionFailed {
        target: executable.to_owned(),
        source: io::Error::new(io::ErrorKind::InvalidInput, format!("NUL in {what}")),
    };

    let mut command_line = CString::new(format!("{executable} {arguments}"))
        .map_err(|_| invalid("command line"))?
        .into_bytes_with_nul();
    let cwd = working_directory
        .map(|dir| CString::new(dir).map_err(|_| invalid("working directory")))
        .transpose()?;

    let mut startup: STARTUPINFOA = unsafe { mem::zeroed() };
    startup.cb = mem::size_of::<STARTUPINFOA>() as u32;
    let mut process_info: PROCESS_INFORMATION = unsafe { mem::zeroed() };

    let created = unsafe {
        CreateProcessA(
            ptr::null(),
            command_line.as_mut_ptr(),
            ptr::null(),
            ptr::null(),
            0,
            CREATE_SUSPENDED,
            ptr::null(),
            cwd.as_ref()
                .map_or(ptr::null(), |dir| dir.as_ptr() as *const u8),
            &startup,
            &mut process_info,
        )
    };
    if created == 0 {
        return Err(InjectError::ProcessAcquisitionFailed {
            target: executable.to_owned(),
            source: io::Error::last_os_error(),
        });
    }

    info!("launched {executable} suspended, pid {}", process_info.dwProcessId);

    // The session reopens the process by pid with the exact rights it needs;
    // the creation handle is surplus.
    drop(OwnedHandle(process_info.hProcess));
    Ok((process_info.dwProcessId, OwnedHandle(process_info.hThread)))
}

/// Resolves the loader entry point used as the remote start routine.
fn loader_entry_point() -> io::Result<LoaderRoutine> {
    let module = CString::new(LOADER_MODULE)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "loader module name"))?;
    let proc = CString::new(LOADER_PROC)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "loader entry point name"))?;

    unsafe {
        let handle = GetModuleHandleA(module.as_ptr() as *const u8);
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        match GetProcAddress(handle, proc.as_ptr() as *const u8) {
            Some(entry) => Ok(mem::transmute::<_, LoaderRoutine>(entry)),
            None => Err(io::Error::last_os_error()),
        }
    }
}
