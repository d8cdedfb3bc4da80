//! Telemetry for the facade itself.
//!
//! Subscriber setup, the diagnostic path for swallowed failures, and
//! counters published through the `metrics` facade.

pub mod diag;
mod layer;
mod logging;
pub mod metrics;

pub use diag::{Diagnostic, DIAG_TARGET};
pub use layer::{level_for, ForwardingLayer};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
