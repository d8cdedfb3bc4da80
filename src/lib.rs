//! clusterlog
//!
//! A role-aware logging facade for multi-process programs. One process is
//! the primary and owns the log output; every other process is a
//! subordinate and forwards its log events to the primary over a local
//! socket. The primary prints forwarded lines with a `(#id) ` prefix, in
//! the order each subordinate sent them, next to its own.
//!
//! ```text
//! [2024-05-01 12:00:00] [INFO] - primary started
//! [2024-05-01 12:00:01] [WARN] - (#4321) slow response
//! ```
//!
//! # Pieces
//!
//! - [`role`]: decides primary vs subordinate from the environment, once.
//! - [`LogContext`]: the emitter every call site uses.
//! - [`ipc`]: framed local-socket channel, subordinate forwarder and
//!   primary accept loop.
//! - [`Aggregator`]: reconstructs forwarded events on the primary.
//!
//! Delivery to the primary is lossy. A log call never blocks on the
//! channel and never reports an error; failures go to the diagnostic
//! stream once per class and to the counters in [`telemetry::metrics`].

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod context;
pub mod event;
pub mod ipc;
pub mod role;
pub mod sink;
pub mod telemetry;

pub use aggregator::{Aggregator, AggregatorError, AggregatorStats, SubordinateInfo};
pub use context::LogContext;
pub use event::{LevelError, LogEvent, LogLevel, SubordinateId};
pub use role::Role;
pub use sink::{InitError, LogSink, SinkConfig, SinkTarget};
