use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

static LOGGER: Logger = Logger {
    sequence: AtomicUsize::new(0),
};

/// Installs the stderr logger with the given maximum level.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Writes records to stderr, numbered in emission order.
struct Logger {
    sequence: AtomicUsize,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        eprintln!(
            "{seq:6} {} {}: {}",
            LevelFormat(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

struct LevelFormat(Level);

impl fmt::Display for LevelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = match self.0 {
            Level::Trace => 35,
            Level::Debug => 34,
            Level::Info => 32,
            Level::Warn => 33,
            Level::Error => 31,
        };
        let msg = match self.0 {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => " INFO",
            Level::Warn => " WARN",
            Level::Error => "ERROR",
        };
        write!(f, "\x1B[{color};1m{msg}\x1B[0m")
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use snafu::ResultExt as _;
    use snafu_utils::GenericError;

    use super::*;

    #[test]
    fn test_second_install_is_reported() {
        let _ = init(LevelFilter::Off);
        let err: GenericError = init(LevelFilter::Off)
            .whatever_context("failed to install logger")
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to install logger");
        assert!(err.source().is_some());
    }
}
