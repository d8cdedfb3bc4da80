//! Forwarding channel between subordinates and the primary.
//!
//! Local socket only (Unix domain socket or named pipe); nothing here opens
//! a network port.

mod endpoint;
mod forwarder;
pub mod framing;
pub mod protocol;
mod server;

pub use forwarder::{
    connect_forwarder, spawn_forwarder, Forwarder, ForwarderConfig, ForwarderHandle,
    ForwarderReport,
};
pub use framing::{read_frame, write_frame, ChannelError};
pub use protocol::{
    decode_envelope, encode_envelope, ControlMessage, Envelope, Hello, LogRecord, ProtocolError,
    RecordError, PROTOCOL_VERSION,
};
pub use server::{AggregatorServer, ControlInbox, ServerConfig, ShutdownResult};
