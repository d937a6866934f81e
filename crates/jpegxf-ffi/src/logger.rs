//! Log forwarding to the host.
//!
//! Once a port is registered, every enabled log record is formatted into one
//! line and posted through the channel's text path, so diagnostics end up in
//! the host's event loop next to the job events.

use log::{LevelFilter, Log, Metadata, Record};

use jpegxf_core::ProgressChannel;

struct HostLogger;

static LOGGER: HostLogger = HostLogger;

impl Log for HostLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}: {}", record.level(), record.target(), record.args());
        ProgressChannel::global().post_text(&line);
    }

    fn flush(&self) {}
}

/// Install the host logger unless the process already has one.
pub(crate) fn install(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Map the host's numeric level (0 = off .. 5 = trace).
pub(crate) fn level_from_code(code: i32) -> LevelFilter {
    match code {
        i32::MIN..=0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_codes() {
        assert_eq!(level_from_code(-3), LevelFilter::Off);
        assert_eq!(level_from_code(0), LevelFilter::Off);
        assert_eq!(level_from_code(1), LevelFilter::Error);
        assert_eq!(level_from_code(3), LevelFilter::Info);
        assert_eq!(level_from_code(5), LevelFilter::Trace);
        assert_eq!(level_from_code(99), LevelFilter::Trace);
    }
}
