use std::io;
use thiserror::Error;

/// Terminal failures of one injection run.
///
/// Every step failure is fatal: already-acquired remote resources are freed
/// best-effort, the error is reported, and the process exits non-zero.
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("malformed argument: {0}")]
    MalformedArgument(String),

    #[error("could not acquire target process {target}: {source}")]
    ProcessAcquisitionFailed { target: String, source: io::Error },

    #[error("remote memory {op} failed: {source}")]
    RemoteMemoryFailed {
        op: &'static str,
        source: io::Error,
    },

    #[error("could not run remote loader thread: {source}")]
    RemoteThreadFailed { source: io::Error },

    #[error("remote loader completed but reported no module handle")]
    PayloadLoadRejected,
}
