//! Log event types shared by the emitter, the forwarding channel and the sink.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity of a log event. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [Self::Error, Self::Warn, Self::Info, Self::Debug];

    /// Wire name (`"error"`, `"warn"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Tag printed between brackets on a sink line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Strict parse of a wire name. Case-sensitive, no aliases.
    pub fn parse(raw: &str) -> Result<Self, LevelError> {
        match raw {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(LevelError::Unknown(other.to_string())),
        }
    }
}

impl FromStr for LogLevel {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("Unrecognized log level: {0:?}")]
    Unknown(String),
}

/// Identifier of a subordinate process, normally its PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubordinateId(pub u32);

impl SubordinateId {
    /// Identifier of the calling process.
    pub fn current_process() -> Self {
        Self(std::process::id())
    }

    /// Prefix placed before forwarded messages, e.g. `"(#4321) "`.
    pub fn prefix(&self) -> String {
        format!("(#{}) ", self.0)
    }
}

impl fmt::Display for SubordinateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single log call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    level: LogLevel,
    message: String,
    source: Option<SubordinateId>,
}

impl LogEvent {
    /// Event raised in the current process.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source: None,
        }
    }

    /// Event received from a subordinate.
    pub fn from_subordinate(
        source: SubordinateId,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> Option<SubordinateId> {
        self.source
    }

    /// Message as it should appear on the sink, prefixed when forwarded.
    pub fn display_message(&self) -> String {
        match self.source {
            Some(id) => format!("{}{}", id.prefix(), self.message),
            None => self.message.clone(),
        }
    }
}
