//! Logging setup: env_logger, bridged through indicatif on a TTY

use indicatif::MultiProgress;

/// Padded label plus ANSI color codes for a level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Short module name for the log line: `pkgsift_crawldb::worker` -> `worker`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Logger that prints through indicatif MultiProgress so lines don't tear bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let (pre, label, post) = level_style(record.level(), true);
            let line = format!(
                "[{pre}{label}{post}] {}: {}",
                short_target(record.target()),
                record.args()
            );
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging. `RUST_LOG` overrides the level picked from the flags.
///
/// With `multi` set (TTY), log lines go through the progress bars; otherwise
/// plain lines with a timestamp for cron logs.
///
/// Returns false if a logger was already installed; that one stays in place.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) -> bool {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    let installed = if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();

        let installed =
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok();
        if installed {
            log::set_max_level(max_level);
        }
        installed
    } else {
        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let (_, label, _) = level_style(record.level(), false);
                writeln!(
                    buf,
                    "{} [{label}] {}: {}",
                    buf.timestamp_seconds(),
                    short_target(record.target()),
                    record.args()
                )
            })
            .try_init()
            .is_ok()
    };
    if !installed {
        log::debug!("logger already installed, keeping it");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_target_strips_crate_path() {
        assert_eq!(short_target("pkgsift_crawldb::worker"), "worker");
        assert_eq!(short_target("pkgsift"), "pkgsift");
    }

    #[test]
    fn second_init_keeps_first_logger() {
        init_logging(true, false, None);
        assert!(!init_logging(false, true, None));
    }

    #[test]
    fn labels_are_padded() {
        for level in [log::Level::Error, log::Level::Info, log::Level::Trace] {
            let (_, label, _) = level_style(level, false);
            assert_eq!(label.len(), 5);
        }
    }

    #[test]
    fn color_codes_only_when_requested() {
        let (pre, _, post) = level_style(log::Level::Warn, false);
        assert!(pre.is_empty() && post.is_empty());
        let (pre, _, post) = level_style(log::Level::Warn, true);
        assert!(pre.starts_with("\x1b["));
        assert_eq!(post, "\x1b[0m");
    }
}
