//! The primary's log sink.
//!
//! Lines have the form `[2026-10-19 14:03:12] [WARN] - message`. Only the
//! primary process ever owns a sink. Line breaks inside a message are
//! written as `\n` and `\r` so that every event stays on one line.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::event::LogLevel;
use crate::telemetry::diag::{self, Diagnostic};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where the primary writes its lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SinkTarget {
    #[default]
    Stdout,
    Stderr,
    /// Opened in append mode, created if missing.
    File(PathBuf),
}

impl SinkTarget {
    pub fn describe(&self) -> String {
        match self {
            SinkTarget::Stdout => "stdout".to_string(),
            SinkTarget::Stderr => "stderr".to_string(),
            SinkTarget::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    pub target: SinkTarget,
    /// Format timestamps in local time instead of UTC.
    pub use_local_time: bool,
}

/// Failure to create the sink. Fatal for the primary.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Failed to open log output {path}: {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Render a sink line without the trailing newline.
pub fn format_line<Tz>(level: LogLevel, timestamp: &DateTime<Tz>, message: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] [{}] - {}",
        timestamp.format(TIMESTAMP_FORMAT),
        level.tag(),
        escape_line_breaks(message)
    )
}

fn escape_line_breaks(message: &str) -> Cow<'_, str> {
    if !message.contains(['\n', '\r']) {
        return Cow::Borrowed(message);
    }
    let mut escaped = String::with_capacity(message.len() + 8);
    for c in message.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Serialized writer shared by every emitter call in the primary.
pub struct LogSink {
    writer: Mutex<Box<dyn Write + Send>>,
    use_local_time: bool,
}

impl LogSink {
    /// Open the sink described by `config`.
    pub fn open(config: &SinkConfig) -> Result<Self, InitError> {
        let writer: Box<dyn Write + Send> = match &config.target {
            SinkTarget::Stdout => Box::new(io::stdout()),
            SinkTarget::Stderr => Box::new(io::stderr()),
            SinkTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::SinkOpen {
                        path: path.clone(),
                        source,
                    })?;
                Box::new(file)
            }
        };
        Ok(Self::from_writer(writer, config.use_local_time))
    }

    /// Wrap any writer, e.g. a [`CaptureBuffer`].
    pub fn from_writer(writer: Box<dyn Write + Send>, use_local_time: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            use_local_time,
        }
    }

    /// Write one line. Failures go to the diagnostic stream, never to the caller.
    pub fn write(&self, level: LogLevel, message: &str) {
        let line = if self.use_local_time {
            format_line(level, &Local::now(), message)
        } else {
            format_line(level, &Utc::now(), message)
        };

        let mut writer = self.writer.lock();
        let result = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        drop(writer);

        if let Err(e) = result {
            diag::report(Diagnostic::SinkWrite, &e);
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("use_local_time", &self.use_local_time)
            .finish_non_exhaustive()
    }
}

/// In-memory writer whose contents stay readable after being handed to a
/// [`LogSink`]. Useful for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
