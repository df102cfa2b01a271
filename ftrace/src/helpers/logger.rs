//! # Logger
//!
//! Handles log:: messages by writing them to stderr, so the events printed on
//! stdout can be piped to other tools.
use std::{
    env,
    io::{stderr, IsTerminal, Write},
    sync::{Arc, Mutex},
};

use anyhow::Result;
use log::{LevelFilter, Metadata, Record};
use termcolor::{BufferedStandardStream, Color, ColorChoice, ColorSpec, WriteColor};
use time::{macros::format_description, OffsetDateTime};

pub struct Logger {
    /// Max level the logger will output.
    max_level: LevelFilter,
    inner: Mutex<LoggerWriter>,
}

struct LoggerWriter {
    stderr: BufferedStandardStream,
    use_colors: bool,
}

impl Logger {
    /// Install the logger as the global log:: implementation.
    pub fn init(max_level: LevelFilter) -> Result<Arc<Self>> {
        let logger = Arc::new(Logger {
            max_level,
            inner: Mutex::new(LoggerWriter {
                stderr: BufferedStandardStream::stderr(ColorChoice::Auto),
                use_colors: Self::use_colors(),
            }),
        });

        log::set_max_level(max_level);
        log::set_boxed_logger(Box::new(Arc::clone(&logger)))?;

        Ok(logger)
    }

    fn try_log(&self, record: &Record) -> Result<()> {
        let inner: &mut LoggerWriter = &mut self.inner.lock().unwrap();
        let verbose = self.max_level >= LevelFilter::Debug;

        if verbose {
            OffsetDateTime::now_utc().format_into(
                &mut inner.stderr,
                format_description!("[hour]:[minute]:[second].[subsecond digits:6] "),
            )?;
        }

        // The level is always shown for errors and warnings, and for all
        // messages in verbose mode.
        if record.level() <= LevelFilter::Warn || verbose {
            if inner.use_colors {
                let color = match record.level() {
                    log::Level::Error => Color::Red,
                    log::Level::Warn => Color::Yellow,
                    log::Level::Info => Color::Blue,
                    log::Level::Debug => Color::Cyan,
                    log::Level::Trace => Color::White,
                };
                inner
                    .stderr
                    .set_color(ColorSpec::new().set_fg(Some(color)))?;
            }
            write!(inner.stderr, "{:5} ", record.level())?;
            if inner.use_colors {
                inner.stderr.reset()?;
            }
        }

        if verbose {
            write!(inner.stderr, "[{}] ", record.target())?;
        }
        writeln!(inner.stderr, "{}", record.args())?;

        inner.stderr.flush()?;
        Ok(())
    }

    fn use_colors() -> bool {
        stderr().is_terminal() && matches!(env::var("TERM"), Ok(x) if x != "dumb")
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Not much we can do to report the error...
        let _ = self.try_log(record);
    }

    fn flush(&self) {
        let _ = self.inner.lock().unwrap().stderr.flush();
    }
}
