use colored::*;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

struct ColoredLogger;

impl ColoredLogger {
    fn is_own_target(target: &str) -> bool {
        target == CRATE_TARGET || target.starts_with(&format!("{}::", CRATE_TARGET))
    }
}

impl log::Log for ColoredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > log::max_level() {
            return false;
        }

        // Dependencies (hyper, reqwest, ...) only get to speak up about problems.
        Self::is_own_target(metadata.target()) || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level = match record.level() {
                Level::Error => record.level().to_string().red(),
                Level::Warn => record.level().to_string().yellow(),
                Level::Info => record.level().to_string().green(),
                Level::Debug => record.level().to_string().blue(),
                Level::Trace => record.level().to_string().purple(),
            };
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");

            println!(
                "{} {:>5} {} - {}",
                timestamp.to_string().dimmed(),
                level,
                record.target().dimmed(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: ColoredLogger = ColoredLogger;

pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_own_module_targets() {
        assert!(ColoredLogger::is_own_target(CRATE_TARGET));
        assert!(ColoredLogger::is_own_target(&format!(
            "{}::scheduler",
            CRATE_TARGET
        )));
        assert!(!ColoredLogger::is_own_target("hyper::proto"));
        assert!(!ColoredLogger::is_own_target(&format!("{}_extra", CRATE_TARGET)));
    }
}
