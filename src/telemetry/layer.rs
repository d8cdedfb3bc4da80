//! `tracing` layer that routes application events through a [`LogContext`].
//!
//! With this layer installed, `tracing::warn!(...)` in application code
//! behaves like `ctx.warn(...)`: written to the sink on the primary,
//! forwarded on a subordinate. The crate's own diagnostics are skipped so
//! a failing sink cannot feed back into itself.

use std::fmt::Write as _;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::context::LogContext;
use crate::event::LogLevel;

/// Whether `target` belongs to this crate's own diagnostics.
pub(crate) fn is_internal(target: &str) -> bool {
    target == "clusterlog" || target.starts_with("clusterlog::")
}

/// Map a `tracing` level onto the four facade levels.
pub fn level_for(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG | Level::TRACE => LogLevel::Debug,
    }
}

pub struct ForwardingLayer {
    ctx: LogContext,
}

impl ForwardingLayer {
    pub fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }
}

impl<S> Layer<S> for ForwardingLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.ctx.log(level_for(metadata.level()), visitor.finish());
    }
}

/// Flattens an event into `message key=value key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), format_args!("{value}"));
    }
}
