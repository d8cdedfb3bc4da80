//! Wire format for the subordinate to primary channel.
//!
//! Every frame carries one [`Envelope`], adjacently tagged:
//! `{"kind": "log", "payload": {"level": "warn", "message": "..."}}`.
//! The aggregator claims only the `log` kind; everything else is left to
//! other consumers of the channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{LevelError, LogEvent, LogLevel, SubordinateId};

/// Version announced in the hello frame.
pub const PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// First frame on every connection; binds it to a subordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub subordinate_id: u32,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Hello {
    pub fn new(id: SubordinateId) -> Self {
        Self {
            subordinate_id: id.0,
            version: PROTOCOL_VERSION,
        }
    }
}

/// A `log` payload that cannot become a [`LogEvent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Level(#[from] LevelError),

    #[error("Log level must be a string, got {0}")]
    LevelNotString(String),

    #[error("Log message missing or not a string")]
    Message,
}

/// A log event as it travels. Both fields stay raw JSON so that any frame of
/// the `log` kind decodes, and the primary can tell a malformed log event
/// apart from a frame that is not a log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub level: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn from_event(event: &LogEvent) -> Self {
        Self {
            level: Some(event.level().as_str().into()),
            message: Some(event.message().into()),
        }
    }

    /// Validated level; a missing level is reported as an empty one.
    pub fn level(&self) -> Result<LogLevel, RecordError> {
        match &self.level {
            None | Some(serde_json::Value::Null) => Ok(LogLevel::parse("")?),
            Some(serde_json::Value::String(raw)) => Ok(LogLevel::parse(raw)?),
            Some(other) => Err(RecordError::LevelNotString(other.to_string())),
        }
    }

    pub fn into_event(self, source: SubordinateId) -> Result<LogEvent, RecordError> {
        let level = self.level()?;
        match self.message {
            Some(serde_json::Value::String(message)) => {
                Ok(LogEvent::from_subordinate(source, level, message))
            }
            _ => Err(RecordError::Message),
        }
    }
}

/// Non-log traffic sharing the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// All frame kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Envelope {
    #[serde(rename = "hello")]
    Hello(Hello),

    #[serde(rename = "log")]
    Log(LogRecord),

    #[serde(rename = "control")]
    Control(ControlMessage),
}

impl Envelope {
    pub fn log(event: &LogEvent) -> Self {
        Envelope::Log(LogRecord::from_event(event))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Hello(_) => "hello",
            Envelope::Log(_) => "log",
            Envelope::Control(_) => "control",
        }
    }
}

/// Encode an envelope to JSON bytes, enforcing `max` bytes.
pub fn encode_envelope(envelope: &Envelope, max: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(envelope)?;
    if bytes.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

/// Decode an envelope from JSON bytes. The size is checked before parsing.
pub fn decode_envelope(bytes: &[u8], max: usize) -> Result<Envelope, ProtocolError> {
    if bytes.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(serde_json::from_slice(bytes)?)
}
