//! Process-wide logging for the calibration tools.
//!
//! [`init_logging`] is the single entry point: a plain stderr logger for the
//! `log` facade, or, with the `tracing` feature, a `tracing-subscriber` that
//! also captures `log` records and reports span timings.

use std::fmt;
use std::io::Write;
#[cfg(not(feature = "tracing"))]
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

/// Output layout of log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `[  1.234s  INFO pipeline] message`
    #[default]
    Plain,
    /// One JSON object per event. Needs the `tracing` feature; plain otherwise.
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    /// Default verbosity. `RUST_LOG` takes precedence under `tracing`.
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            format: LogFormat::Plain,
        }
    }
}

impl LogOptions {
    /// `Debug` when `verbose`, `Info` otherwise.
    pub fn verbose(verbose: bool) -> Self {
        Self {
            level: if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            ..Self::default()
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("a global logger is already installed")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Trailing segment of a module path, e.g. `pipeline` for `chesscal::pipeline`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    format!(
        "[{elapsed:7.3}s {level:>5} {}] {args}",
        short_target(target)
    )
}

#[cfg_attr(feature = "tracing", allow(dead_code))]
struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {}
}

#[cfg(not(feature = "tracing"))]
static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

#[cfg(not(feature = "tracing"))]
fn init_stderr(level: LevelFilter) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_tracing(options: LogOptions) -> Result<(), LoggerError> {
    let default = options.level.to_string().to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    // A subscriber installed earlier (e.g. by a test harness) wins.
    let _ = match options.format {
        LogFormat::Json => builder.json().flatten_event(true).finish().try_init(),
        LogFormat::Plain => builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init(),
    };
    Ok(())
}

/// Install the process-wide logger. Calls after the first one are no-ops.
pub fn init_logging(options: LogOptions) -> Result<(), LoggerError> {
    #[cfg(feature = "tracing")]
    {
        init_tracing(options)
    }
    #[cfg(not(feature = "tracing"))]
    {
        init_stderr(options.level)
    }
}
