// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Keelboot Contributors

//! Trace log for the Keelboot core
//!
//! A single trace sink: entries are written to a circular buffer that a
//! debugger or the platform UART shim can drain. The core has no clock,
//! so entries carry a buffer-assigned sequence number instead of a
//! timestamp. With the `trace` feature disabled the `log_*!` macros
//! compile to nothing.
//!
//! # Security
//!
//! The trace sink is diagnostic only and never part of the trust
//! boundary. Key material, nonces and seeds must never be logged.

use core::fmt::{self, Write};
use heapless::String;

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Log buffer size (number of entries)
pub const LOG_BUFFER_SIZE: usize = 32;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that abort or degrade the boot
    Error = 0,
    /// Recoverable anomalies (skipped elements, fallbacks)
    Warn = 1,
    /// Boot flow narration
    Info = 2,
    /// Development detail
    Debug = 3,
}

impl LogLevel {
    /// Get the log level name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One trace entry
#[derive(Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Sequence number assigned by the buffer
    pub seq: u32,
    /// Originating module name
    pub module: &'static str,
    /// Formatted message
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:06}] {:5} [{}] {}",
            self.seq,
            self.level.as_str(),
            self.module,
            self.message
        )
    }
}

/// Circular trace buffer
pub struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_SIZE],
    write_index: usize,
    count: usize,
    next_seq: u32,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Create a new empty log buffer
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<LogEntry> = None;
        Self {
            entries: [NONE; LOG_BUFFER_SIZE],
            write_index: 0,
            count: 0,
            next_seq: 0,
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum level recorded
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Check whether a level would be recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Format and record an entry
    pub fn log(&mut self, level: LogLevel, module: &'static str, args: fmt::Arguments<'_>) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        // Truncation on overflow is acceptable for trace output
        let _ = message.write_fmt(args);

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.entries[self.write_index] = Some(LogEntry {
            level,
            seq,
            module,
            message,
        });
        self.write_index = (self.write_index + 1) % LOG_BUFFER_SIZE;
        if self.count < LOG_BUFFER_SIZE {
            self.count += 1;
        }
    }

    /// Number of retained entries
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check if the buffer is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate over retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        let start = if self.count < LOG_BUFFER_SIZE {
            0
        } else {
            self.write_index
        };
        (0..self.count).filter_map(move |i| {
            self.entries[(start + i) % LOG_BUFFER_SIZE].as_ref()
        })
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Log an error message
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $module, format_args!($($arg)*))
    };
}

/// Log a warning message
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $module, format_args!($($arg)*))
    };
}

/// Log an error message (traced out)
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {{
        let _ = &$buffer;
    }};
}

/// Log a warning message (traced out)
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {{
        let _ = &$buffer;
    }};
}

/// Log an informational message (traced out)
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {{
        let _ = &$buffer;
    }};
}

/// Log a debug message (traced out)
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {{
        let _ = &$buffer;
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_wrap_and_keep_sequence() {
        let mut buf = LogBuffer::new();
        for i in 0..(LOG_BUFFER_SIZE + 4) {
            buf.log(LogLevel::Info, "test", format_args!("entry {}", i));
        }
        assert_eq!(buf.len(), LOG_BUFFER_SIZE);

        let first = buf.iter().next().unwrap();
        assert_eq!(first.seq, 4);
        let last = buf.iter().last().unwrap();
        assert_eq!(last.seq, (LOG_BUFFER_SIZE + 3) as u32);
    }

    #[test]
    fn min_level_filters() {
        let mut buf = LogBuffer::new();
        buf.set_min_level(LogLevel::Warn);
        buf.log(LogLevel::Info, "test", format_args!("dropped"));
        buf.log(LogLevel::Error, "test", format_args!("kept"));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.iter().next().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn long_messages_truncate() {
        let mut buf = LogBuffer::new();
        buf.log(
            LogLevel::Info,
            "test",
            format_args!("{:width$}", "x", width = 2 * MAX_LOG_MESSAGE_LEN),
        );
        assert_eq!(buf.iter().next().unwrap().message.len(), MAX_LOG_MESSAGE_LEN);
    }
}
