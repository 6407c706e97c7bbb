//! File-backed debug logging.
//!
//! The visualizer owns the terminal in raw mode, so diagnostics cannot go to
//! stderr without corrupting the display. When `--debug` is set, messages are
//! appended to a log file in the temp directory instead.

use std::fs::File;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

/// Log file permissions (owner read/write only).
const DEBUG_LOG_MODE: u32 = 0o600;

/// Writes to a log file when debug mode is enabled, otherwise does nothing.
pub struct DebugLogger {
    file: Option<File>,
}

impl DebugLogger {
    /// Path of the debug log file.
    pub fn log_path() -> PathBuf {
        std::env::temp_dir().join("twinscope-debug.log")
    }

    pub fn new(debug_enabled: bool) -> Self {
        use std::fs::OpenOptions;

        let file = if debug_enabled {
            let path = Self::log_path();
            // Exclusive create first; if the file exists, truncate in place.
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(DEBUG_LOG_MODE)
                .open(&path)
                .or_else(|_| OpenOptions::new().write(true).truncate(true).open(&path))
                .ok()
        } else {
            None
        };
        Self { file }
    }

    /// Write a formatted message to the log file (if enabled).
    pub fn log(&mut self, args: std::fmt::Arguments) {
        use std::io::Write;
        if let Some(ref mut f) = self.file {
            let _ = writeln!(f, "{}", args);
            let _ = f.flush();
        }
    }
}

/// Convenience macro for debug logging with format args.
macro_rules! dbg_log {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log(format_args!($($arg)*))
    };
}

pub(crate) use dbg_log;
