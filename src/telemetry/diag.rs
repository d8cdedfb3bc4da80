//! Diagnostic path for failures the facade swallows.
//!
//! Per-event failures never reach the caller. Each class is reported once
//! per process through `tracing` (target [`DIAG_TARGET`]); after that only
//! the counters move.

use std::sync::atomic::{AtomicBool, Ordering};

use super::metrics;

/// `tracing` target of every diagnostic event.
pub const DIAG_TARGET: &str = "clusterlog::diag";

/// Failure classes surfaced on the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// The primary's sink rejected a write.
    SinkWrite,
    /// The subordinate's forwarding queue was full.
    QueueFull,
    /// The subordinate's forwarding queue was closed (writer gone).
    ChannelClosed,
    /// Writing a frame to the primary failed.
    TransportWrite,
    /// An encoded event exceeded the frame limit.
    FrameTooLarge,
    /// A forwarded log event carried an unknown level.
    MalformedEvent,
    /// A connection did not open with a valid hello frame.
    HandshakeRejected,
    /// Two live connections announced the same subordinate id.
    DuplicateSubordinate,
}

const CLASS_COUNT: usize = 8;

static REPORTED: [AtomicBool; CLASS_COUNT] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

impl Diagnostic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinkWrite => "sink_write",
            Self::QueueFull => "queue_full",
            Self::ChannelClosed => "channel_closed",
            Self::TransportWrite => "transport_write",
            Self::FrameTooLarge => "frame_too_large",
            Self::MalformedEvent => "malformed_event",
            Self::HandshakeRejected => "handshake_rejected",
            Self::DuplicateSubordinate => "duplicate_subordinate",
        }
    }

    /// Whether this class costs a log line.
    pub fn drops_event(&self) -> bool {
        !matches!(self, Self::HandshakeRejected | Self::DuplicateSubordinate)
    }

    fn index(&self) -> usize {
        match self {
            Self::SinkWrite => 0,
            Self::QueueFull => 1,
            Self::ChannelClosed => 2,
            Self::TransportWrite => 3,
            Self::FrameTooLarge => 4,
            Self::MalformedEvent => 5,
            Self::HandshakeRejected => 6,
            Self::DuplicateSubordinate => 7,
        }
    }
}

/// Count a failure and, the first time its class shows up, log it.
///
/// Returns `true` when this call produced the diagnostic line.
pub fn report(kind: Diagnostic, detail: &dyn std::fmt::Display) -> bool {
    if kind.drops_event() {
        metrics::record_dropped(kind.as_str());
    }

    let first = !REPORTED[kind.index()].swap(true, Ordering::Relaxed);
    if first {
        tracing::warn!(
            target: DIAG_TARGET,
            kind = kind.as_str(),
            "{}; further occurrences are counted only",
            detail
        );
    }
    first
}

/// Whether `kind` has already been reported in this process.
pub fn was_reported(kind: Diagnostic) -> bool {
    REPORTED[kind.index()].load(Ordering::Relaxed)
}
