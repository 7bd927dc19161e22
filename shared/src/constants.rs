/// Module hosting the remote loader entry point.
///
/// kernel32 is mapped at the same base address in every process of a session,
/// so an address resolved in the injector is valid inside the target as well.
pub const LOADER_MODULE: &str = "kernel32.dll";

/// ANSI loader entry point used as the remote thread start routine.
///
/// Its single argument is the path string the injector wrote into the target,
/// and its return value becomes the remote thread's exit code: non-zero means
/// the module handle was obtained, i.e. the payload is resident.
pub const LOADER_PROC: &str = "LoadLibraryA";
