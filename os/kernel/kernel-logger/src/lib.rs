//! # Kernel Console and Logging
//!
//! Diagnostic output for the process core without owning any device. The
//! board support code registers a byte writer (the mini UART on the
//! Raspberry Pi) with [`set_console`]; everything else writes through it:
//!
//! ```text
//! log::info!(..) ──► SinkLogger ─┐
//! console_trace!(..) ────────────┼─► ConsoleSink (fmt::Write) ──► registered putc
//! sys_write(buf) ────────────────┘
//! ```
//!
//! Output is best effort. Before a console is registered, or with the
//! `enabled` feature turned off, all output is dropped; nothing in the kernel
//! depends on it succeeding.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_logger::{SinkLogger, set_console};
//! use log::{LevelFilter, info};
//!
//! fn uart_send(_byte: u8) { /* poke the UART data register */ }
//!
//! set_console(uart_send).ok();
//! SinkLogger::new(LevelFilter::Debug).init().ok();
//! info!("scheduler up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod logger;

pub use logger::SinkLogger;

use kernel_sync::SyncOnceCell;

/// Byte writer installed by the board support code.
pub type Putc = fn(u8);

static CONSOLE: SyncOnceCell<Putc> = SyncOnceCell::new();

/// A console writer was already registered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConsoleAlreadySet;

/// Register the byte writer all console output goes to. Only the first call
/// takes effect.
///
/// # Errors
/// [`ConsoleAlreadySet`] on every call after the first.
pub fn set_console(putc: Putc) -> Result<(), ConsoleAlreadySet> {
    CONSOLE.set(putc).map(|_| ()).map_err(|_| ConsoleAlreadySet)
}

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod console_fmt {
    use core::fmt::{self, Write};

    /// A `fmt::Write` over the registered console.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct ConsoleSink;

    impl ConsoleSink {
        /// Write raw bytes, translating `\n` to `\r\n` for serial terminals.
        pub fn write_bytes(&mut self, bytes: &[u8]) {
            let Some(putc) = super::CONSOLE.get() else {
                return;
            };
            for &b in bytes {
                if b == b'\n' {
                    putc(b'\r');
                }
                putc(b);
            }
        }
    }

    impl Write for ConsoleSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.write_bytes(s.as_bytes());
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn console_write(args: fmt::Arguments) {
        // Best-effort output.
        let _ = fmt::write(&mut ConsoleSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod console_fmt {
    use core::fmt;

    #[derive(Copy, Clone, Debug, Default)]
    pub struct ConsoleSink;

    impl ConsoleSink {
        pub fn write_bytes(&mut self, _bytes: &[u8]) {}
    }

    impl fmt::Write for ConsoleSink {
        fn write_str(&mut self, _s: &str) -> fmt::Result {
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn console_write(_: fmt::Arguments) {}
}

pub use console_fmt::ConsoleSink;

/// Formatted output straight to the console, bypassing `log`.
#[macro_export]
macro_rules! console_trace {
    ($($arg:tt)*) => {{
        $crate::console_fmt::console_write(core::format_args!($($arg)*));
    }};
}

#[cfg(all(test, feature = "enabled"))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

    fn capture(b: u8) {
        CAPTURED.lock().unwrap().push(b);
    }

    #[test]
    fn console_output_reaches_the_registered_writer() {
        // The console is process-global, so everything is checked in one test.
        assert_eq!(set_console(capture), Ok(()));
        assert_eq!(set_console(capture), Err(ConsoleAlreadySet));

        console_trace!("pid {}\n", 3);
        ConsoleSink.write_bytes(b"ok");

        SinkLogger::new(log::LevelFilter::Info).init().unwrap();
        log::info!(target: "sched", "tick");
        log::debug!(target: "sched", "filtered");

        let out = String::from_utf8(CAPTURED.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "pid 3\r\nok[INFO] sched: tick\r\n");
    }
}
