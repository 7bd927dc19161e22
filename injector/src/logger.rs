use flexi_logger::{DeferredNow, Logger, LoggerHandle};
use log::Record;
use std::io::Write;
use std::{env, thread};

/// Initializes stderr logging with custom formatting.
///
/// `GRAPNEL_LOG` overrides the default spec with the usual
/// `module=level` syntax.
pub fn init() -> Result<LoggerHandle, Box<dyn std::error::Error>> {
    let spec = env::var("GRAPNEL_LOG").unwrap_or_else(|_| "info".to_owned());
    let handle = Logger::try_with_str(&spec)?.format(log_format).start()?;
    Ok(handle)
}

/// Custom log line format: timestamp, level, source file/line, thread name,
/// and message.
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} [{:<5}] [{}:{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        thread::current().name().unwrap_or("<unnamed>"),
        &record.args()
    )
}
