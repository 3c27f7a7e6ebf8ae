use crate::console_trace;
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing `[LEVEL] target: message` lines to the console.
pub struct SinkLogger {
    max_level: LevelFilter,
}

static LOGGER: SyncOnceCell<SinkLogger> = SyncOnceCell::new();

impl SinkLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// [`SetLoggerError`] if a logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        let logger: &'static Self = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        console_trace!("[{}] {}: {}\n", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}
