//! Counters published through the `metrics` facade.
//!
//! Nothing is exported unless the host installs a recorder.

pub const EVENTS_FORWARDED: &str = "clusterlog_events_forwarded_total";
pub const EVENTS_DROPPED: &str = "clusterlog_events_dropped_total";
pub const EVENTS_UNHANDLED: &str = "clusterlog_events_unhandled_total";
pub const SUBORDINATES_ACTIVE: &str = "clusterlog_subordinates_active";

/// A forwarded event reached the primary's sink.
pub fn record_forwarded(level: &'static str) {
    metrics::counter!(EVENTS_FORWARDED, "level" => level).increment(1);
}

/// An event was lost; `reason` is a diagnostic class name.
pub fn record_dropped(reason: &'static str) {
    metrics::counter!(EVENTS_DROPPED, "reason" => reason).increment(1);
}

/// A frame was left for other consumers.
pub fn record_unhandled() {
    metrics::counter!(EVENTS_UNHANDLED).increment(1);
}

pub fn set_active_subordinates(count: usize) {
    metrics::gauge!(SUBORDINATES_ACTIVE).set(count as f64);
}
