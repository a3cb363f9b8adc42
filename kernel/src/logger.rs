// SPDX-License-Identifier: MPL-2.0

//! Logging support.
//!
//! The logger prints to the standard error stream. Messages are printed in
//! their entirety without being mixed with concurrently generated ones.

use log::{LevelFilter, Metadata, Record};
use spin::Once;

use crate::{prelude::*, time::MonotonicClock};

struct KauthLogger {
    clock: Once<Arc<dyn Clock>>,
}

static LOGGER: KauthLogger = KauthLogger { clock: Once::new() };

impl log::Log for KauthLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = self
            .clock
            .get()
            .map_or(0.0, |clock| clock.read_time().as_secs_f64());

        // Use a global lock to prevent interleaving of log messages.
        static RECORD_LOCK: Mutex<()> = Mutex::new(());
        let _lock = RECORD_LOCK.lock();

        print_logs(record, timestamp);
    }

    fn flush(&self) {}
}

#[cfg(feature = "log_color")]
fn print_logs(record: &Record, timestamp: f64) {
    use owo_colors::Style;

    let timestamp_style = Style::new().green();
    let record_style = Style::new().default_color();
    let level_style = match record.level() {
        log::Level::Error => Style::new().red(),
        log::Level::Warn => Style::new().bright_yellow(),
        log::Level::Info => Style::new().blue(),
        log::Level::Debug => Style::new().bright_green(),
        log::Level::Trace => Style::new().bright_black(),
    };

    std::eprintln!(
        "{} {:<5}: {}",
        timestamp_style.style(format_args!("[{:>10.3}]", timestamp)),
        level_style.style(record.level()),
        record_style.style(record.args())
    );
}

#[cfg(not(feature = "log_color"))]
fn print_logs(record: &Record, timestamp: f64) {
    std::eprintln!(
        "{} {:<5}: {}",
        format_args!("[{:>10.3}]", timestamp),
        record.level(),
        record.args()
    );
}

/// Installs the logger and sets the maximum level.
///
/// Only the first call installs the logger and picks the timestamp clock;
/// every call updates the level.
pub fn init(level: LevelFilter, clock: Option<Arc<dyn Clock>>) {
    LOGGER
        .clock
        .call_once(|| clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())));
    // Another logger may already be installed, e.g. by a test harness.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Parses a log level the way the kernel command line does.
pub fn parse_log_level(value: &str) -> LevelFilter {
    match value {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        // Otherwise, OFF
        _ => LevelFilter::Off,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_log_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_log_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_log_level("verbose"), LevelFilter::Off);
    }

    #[test]
    fn init_is_repeatable() {
        init(LevelFilter::Error, None);
        init(LevelFilter::Warn, None);
        assert_eq!(log::max_level(), LevelFilter::Warn);
        error!("kauth: logger test message");
    }
}
