//! Leveled logging macros for webd
//!
//! Thread-safe, optionally-flushing log output. The sink defaults to stderr
//! and can be redirected once to a log file (the `-l` flag of the server
//! binary). Every write happens under a lock so lines from different
//! reactor threads never interleave.
//!
//! # Environment Variables
//!
//! - `WEBD_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `WEBD_LOG_FLUSH=1` - Flush the sink after each line
//!
//! # Usage
//!
//! ```ignore
//! use webd_core::{log_error, log_info, log_warn};
//!
//! log_info!("worker {} started", id);
//! log_warn!("unexpected mask: {:#x}", mask);
//! log_error!("bind failed: {}", err);
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

/// Log levels, lowest to most verbose
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// File sink, set at most once by `set_log_file`. When unset, lines go to
/// a locked stderr handle.
static FILE_SINK: OnceLock<Mutex<File>> = OnceLock::new();

/// Initialize level and flush mode from environment variables.
///
/// Called automatically on first log; calling it explicitly makes
/// initialization deterministic.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("WEBD_LOG_FLUSH") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("WEBD_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Redirect all subsequent log lines to `path` (append, create).
///
/// May be called at most once; later calls are ignored. Returns an error
/// if the file cannot be opened.
pub fn set_log_file(path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = FILE_SINK.set(Mutex::new(file));
    Ok(())
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

#[inline]
fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Internal: leveled line write under the sink lock.
#[doc(hidden)]
pub fn _wlog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    match FILE_SINK.get() {
        Some(sink) => {
            let mut file = sink.lock().unwrap();
            let _ = write!(file, "{} ", level.prefix());
            let _ = file.write_fmt(args);
            let _ = file.write_all(b"\n");
            if flush_enabled() {
                let _ = file.flush();
            }
        }
        None => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            let _ = write!(handle, "{} ", level.prefix());
            let _ = handle.write_fmt(args);
            let _ = handle.write_all(b"\n");
            if flush_enabled() {
                let _ = handle.flush();
            }
        }
    }
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::wlog::_wlog_impl(
            $crate::wlog::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::wlog::_wlog_impl(
            $crate::wlog::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::wlog::_wlog_impl(
            $crate::wlog::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::wlog::_wlog_impl(
            $crate::wlog::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::wlog::_wlog_impl(
            $crate::wlog::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_ordered() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(1), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(4), LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_macros_compile() {
        // Just verify the macros expand; suppress output during the run.
        set_log_level(LogLevel::Off);

        log_error!("error {}", "msg");
        log_warn!("warn");
        log_info!("info {}", 42);
        log_debug!("debug");
        log_trace!("trace");
    }
}
