//! Primary-side reconstruction of forwarded log events.
//!
//! The [`Aggregator`] decodes frames received from subordinates, claims the
//! ones that are log events and writes them to the primary's sink with a
//! `(#id) ` prefix. Frames of any other kind are reported as unhandled so
//! the owner of the channel can pass them to other consumers.
//!
//! Identifiers are not assumed unique over the primary's lifetime. A second
//! connection announcing an id that is still connected takes over the
//! registry entry with a new generation; the older connection's
//! deregistration is then ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::context::LogContext;
use crate::event::SubordinateId;
use crate::ipc::protocol::{decode_envelope, Envelope, LogRecord};
use crate::telemetry::diag::{self, Diagnostic};
use crate::telemetry::metrics;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Aggregator requires a primary log context (got {0})")]
    NotPrimary(String),
}

/// Registry entry for a connected subordinate.
#[derive(Debug)]
struct SubordinateEntry {
    prefix: String,
    generation: u64,
    forwarded: AtomicU64,
}

/// Public view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubordinateInfo {
    pub id: SubordinateId,
    pub generation: u64,
    pub forwarded: u64,
}

/// Point-in-time aggregator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    pub forwarded: u64,
    pub dropped_malformed: u64,
    pub unhandled: u64,
    pub active_subordinates: usize,
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    dropped_malformed: AtomicU64,
    unhandled: AtomicU64,
}

struct AggregatorInner {
    ctx: LogContext,
    registry: DashMap<SubordinateId, SubordinateEntry>,
    next_generation: AtomicU64,
    counters: Counters,
    max_frame_size: usize,
}

/// Master aggregator. Cloning shares the registry and counters.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

impl Aggregator {
    pub fn new(ctx: LogContext) -> Result<Self, AggregatorError> {
        Self::with_frame_limit(ctx, crate::config::DEFAULT_FRAME_LIMIT)
    }

    pub fn with_frame_limit(
        ctx: LogContext,
        max_frame_size: usize,
    ) -> Result<Self, AggregatorError> {
        if !ctx.is_primary() {
            return Err(AggregatorError::NotPrimary(ctx.role().as_str().to_string()));
        }
        Ok(Self {
            inner: Arc::new(AggregatorInner {
                ctx,
                registry: DashMap::new(),
                next_generation: AtomicU64::new(1),
                counters: Counters::default(),
                max_frame_size,
            }),
        })
    }

    pub fn context(&self) -> &LogContext {
        &self.inner.ctx
    }

    /// Record a connection for `id` and return its generation.
    pub fn register(&self, id: SubordinateId) -> u64 {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = SubordinateEntry {
            prefix: id.prefix(),
            generation,
            forwarded: AtomicU64::new(0),
        };
        if let Some(previous) = self.inner.registry.insert(id, entry) {
            diag::report(
                Diagnostic::DuplicateSubordinate,
                &format_args!(
                    "subordinate {id} connected again (generation {} replaced by {generation})",
                    previous.generation
                ),
            );
        }
        metrics::set_active_subordinates(self.inner.registry.len());
        generation
    }

    /// Drop the entry for `id` if it still belongs to `generation`.
    pub fn unregister(&self, id: SubordinateId, generation: u64) -> bool {
        let removed = self
            .inner
            .registry
            .remove_if(&id, |_, entry| entry.generation == generation)
            .is_some();
        if removed {
            metrics::set_active_subordinates(self.inner.registry.len());
        }
        removed
    }

    pub fn is_registered(&self, id: SubordinateId) -> bool {
        self.inner.registry.contains_key(&id)
    }

    pub fn subordinates(&self) -> Vec<SubordinateInfo> {
        let mut list: Vec<_> = self
            .inner
            .registry
            .iter()
            .map(|entry| SubordinateInfo {
                id: *entry.key(),
                generation: entry.generation,
                forwarded: entry.forwarded.load(Ordering::Relaxed),
            })
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }

    /// Handle one raw frame from subordinate `id`.
    ///
    /// Returns `true` only for a log event with a recognized level, which
    /// has then been written to the sink. Everything else returns `false`.
    pub fn on_subordinate_event(&self, id: SubordinateId, raw: &[u8]) -> bool {
        match decode_envelope(raw, self.inner.max_frame_size) {
            Ok(Envelope::Log(record)) => self.on_log_record(id, record),
            Ok(_) | Err(_) => {
                self.inner.counters.unhandled.fetch_add(1, Ordering::Relaxed);
                metrics::record_unhandled();
                false
            }
        }
    }

    /// Handle an already decoded log record from subordinate `id`.
    pub fn on_log_record(&self, id: SubordinateId, record: LogRecord) -> bool {
        let event = match record.into_event(id) {
            Ok(event) => event,
            Err(e) => {
                self.inner
                    .counters
                    .dropped_malformed
                    .fetch_add(1, Ordering::Relaxed);
                diag::report(
                    Diagnostic::MalformedEvent,
                    &format_args!("log event from subordinate {id} dropped: {e}"),
                );
                return false;
            }
        };

        let level = event.level();
        match self.inner.registry.get(&id) {
            Some(entry) => {
                entry.forwarded.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .ctx
                    .write_forwarded(level, &entry.prefix, event.message());
            }
            None => self
                .inner
                .ctx
                .write_forwarded(level, &id.prefix(), event.message()),
        }

        self.inner.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::record_forwarded(level.as_str());
        true
    }

    pub fn stats(&self) -> AggregatorStats {
        let c = &self.inner.counters;
        AggregatorStats {
            forwarded: c.forwarded.load(Ordering::Relaxed),
            dropped_malformed: c.dropped_malformed.load(Ordering::Relaxed),
            unhandled: c.unhandled.load(Ordering::Relaxed),
            active_subordinates: self.inner.registry.len(),
        }
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("stats", &self.stats())
            .finish()
    }
}
