//! Logging for the Satin configuration core.
//!
//! Components log through the injected [`Logger`] capability. Binaries call
//! [`init_subscriber`] once at startup and keep the returned guard alive until
//! teardown so buffered file output is flushed.

mod logger;

pub use logger::{LogLevel, Logger, MemoryLogger, TracingLogger};

use std::{
    env,
    io::{self, Write},
    path::Path,
};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Writes every line to both halves. A failure on one half does not stop the
/// other; the first error is reported after both were tried.
struct Tee<A, B> {
    console: A,
    file: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let console = self.console.write_all(buf);
        let file = self.file.write_all(buf);
        console.and(file).map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let console = self.console.flush();
        let file = self.file.flush();
        console.and(file)
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    console: A,
    file: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            console: self.console.make_writer(),
            file: self.file.make_writer(),
        }
    }
}

fn file_writer(settings: &LogSettings) -> (NonBlocking, WorkerGuard) {
    let log_path = Path::new(&settings.file_path);
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("/tmp"));
    let log_filename = log_path.file_name().unwrap_or("satin.log".as_ref());
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, log_filename))
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

/// Subscriber settings, normally read from the environment.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub output: LogOutput,
    pub file_path: String,
}

impl LogSettings {
    /// Reads `SATIN_LOG_LEVEL`, `SATIN_LOG_FORMAT`, `SATIN_LOG_OUTPUT` and
    /// `SATIN_LOG_FILE`.
    pub fn from_env() -> Self {
        let level = env::var("SATIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = env::var("SATIN_LOG_FORMAT").unwrap_or_else(|_| "human".to_string());
        let output = match env::var("SATIN_LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Console,
        };
        let file_path = env::var("SATIN_LOG_FILE").unwrap_or_else(|_| "/tmp/satin.log".to_string());

        Self {
            level,
            json: format == "json",
            output,
            file_path,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            output: LogOutput::Console,
            file_path: "/tmp/satin.log".to_string(),
        }
    }
}

/// Keeps the non-blocking file writer alive. Dropping it (or calling
/// [`LoggingGuard::shutdown`]) flushes pending lines.
#[must_use = "dropping the guard immediately stops file logging"]
pub struct LoggingGuard {
    worker: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn shutdown(self) {
        drop(self.worker);
    }
}

/// Initializes the global tracing subscriber from environment variables.
pub fn init_subscriber() -> LoggingGuard {
    init_with(&LogSettings::from_env())
}

/// Initializes the global tracing subscriber. A second call keeps the first
/// subscriber and returns an inert guard.
pub fn init_with(settings: &LogSettings) -> LoggingGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let mut worker: Option<WorkerGuard> = None;
    let subscriber = registry().with(env_filter);

    let installed = match settings.output {
        LogOutput::Both => {
            let (non_blocking, guard) = file_writer(settings);
            worker = Some(guard);

            let tee_writer = MakeTee {
                console: std::io::stdout,
                file: non_blocking,
            };
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if settings.json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer.pretty()).try_init()
            }
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if settings.json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer.compact()).try_init()
            }
        }
        LogOutput::File => {
            let (non_blocking, guard) = file_writer(settings);
            worker = Some(guard);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if settings.json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer).try_init()
            }
        }
    };

    if installed.is_err() {
        // Someone else owns the global subscriber.
        worker = None;
    }

    LoggingGuard { worker }
}
