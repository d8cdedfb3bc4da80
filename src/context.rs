//! The log emitter.
//!
//! A [`LogContext`] is built once per process and handed to every call
//! site. It carries the process role, fixed at construction, and routes
//! each call either to the primary's sink or to the forwarding channel.
//!
//! Dispatch never blocks and never fails from the caller's point of view:
//! sink writes are short synchronous writes, and forwarding is a
//! `try_send` into a bounded queue. Delivery to the primary is
//! deliberately lossy; there is no retry and no acknowledgment.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config;
use crate::event::{LogEvent, LogLevel, SubordinateId};
use crate::ipc::Forwarder;
use crate::role::{self, Role};
use crate::sink::{InitError, LogSink, SinkConfig};
use crate::telemetry::diag::{self, Diagnostic};

struct ContextInner {
    role: Role,
    sink_config: SinkConfig,
    sink: OnceLock<LogSink>,
    init_lock: Mutex<()>,
    forwarder: OnceLock<Forwarder>,
}

/// Process-wide logging context. Cloning is cheap.
#[derive(Clone)]
pub struct LogContext {
    inner: Arc<ContextInner>,
}

impl LogContext {
    pub fn new(role: Role, sink_config: SinkConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                role,
                sink_config,
                sink: OnceLock::new(),
                init_lock: Mutex::new(()),
                forwarder: OnceLock::new(),
            }),
        }
    }

    pub fn primary(sink_config: SinkConfig) -> Self {
        Self::new(Role::Primary, sink_config)
    }

    pub fn subordinate(id: SubordinateId) -> Self {
        Self::new(Role::Subordinate(id), SinkConfig::default())
    }

    /// Context for the detected process role and environment configuration.
    pub fn from_env() -> Self {
        Self::new(role::current(), config::load().sink)
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn is_primary(&self) -> bool {
        self.inner.role.is_primary()
    }

    /// Open the sink. Idempotent; a no-op for subordinates.
    pub fn initialize(&self) -> Result<(), InitError> {
        if !self.is_primary() || self.inner.sink.get().is_some() {
            return Ok(());
        }

        let _guard = self.inner.init_lock.lock();
        if self.inner.sink.get().is_some() {
            return Ok(());
        }
        let sink = LogSink::open(&self.inner.sink_config)?;
        let _ = self.inner.sink.set(sink);
        Ok(())
    }

    /// Use a caller-built sink instead of [`initialize`](Self::initialize).
    ///
    /// Returns `false` when the context is a subordinate or already has a sink.
    pub fn install_sink(&self, sink: LogSink) -> bool {
        if !self.is_primary() {
            return false;
        }
        let _guard = self.inner.init_lock.lock();
        self.inner.sink.set(sink).is_ok()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.sink.get().is_some()
    }

    /// Attach the channel a subordinate forwards through.
    ///
    /// Returns `false` for the primary or when a forwarder is already attached.
    pub fn attach_forwarder(&self, forwarder: Forwarder) -> bool {
        if self.is_primary() {
            return false;
        }
        self.inner.forwarder.set(forwarder).is_ok()
    }

    pub fn forwarder(&self) -> Option<&Forwarder> {
        self.inner.forwarder.get()
    }

    /// Write a line that arrived from a subordinate. Silent before `initialize`.
    pub(crate) fn write_forwarded(&self, level: LogLevel, prefix: &str, message: &str) {
        if let Some(sink) = self.inner.sink.get() {
            sink.write(level, &format!("{prefix}{message}"));
        }
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.dispatch(LogEvent::new(level, message.as_ref()));
    }

    /// Route a built event according to the role.
    pub fn dispatch(&self, event: LogEvent) {
        match self.inner.role {
            Role::Primary => {
                // Without a sink the primary is silent.
                if let Some(sink) = self.inner.sink.get() {
                    sink.write(event.level(), &event.display_message());
                }
            }
            Role::Subordinate(_) => match self.inner.forwarder.get() {
                Some(forwarder) => forwarder.send(&event),
                None => {
                    diag::report(
                        Diagnostic::ChannelClosed,
                        &"log event dropped: no forwarding channel attached",
                    );
                }
            },
        }
    }
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext")
            .field("role", &self.inner.role)
            .field("initialized", &self.is_initialized())
            .field("forwarding", &self.inner.forwarder.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CaptureBuffer;

    fn captured_primary() -> (LogContext, CaptureBuffer) {
        let ctx = LogContext::primary(SinkConfig::default());
        let buffer = CaptureBuffer::new();
        assert!(ctx.install_sink(LogSink::from_writer(Box::new(buffer.clone()), false)));
        (ctx, buffer)
    }

    #[test]
    fn primary_writes_each_level() {
        let (ctx, buffer) = captured_primary();
        ctx.error("e");
        ctx.warn("w");
        ctx.info("i");
        ctx.debug("d");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("[ERROR] - e"));
        assert!(lines[1].ends_with("[WARN] - w"));
        assert!(lines[2].ends_with("[INFO] - i"));
        assert!(lines[3].ends_with("[DEBUG] - d"));
    }

    #[test]
    fn uninitialized_primary_is_silent() {
        let ctx = LogContext::primary(SinkConfig::default());
        ctx.error("nobody hears this");
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn second_sink_is_refused() {
        let (ctx, _buffer) = captured_primary();
        let other = LogSink::from_writer(Box::new(CaptureBuffer::new()), false);
        assert!(!ctx.install_sink(other));
    }

    #[test]
    fn initialize_is_idempotent_after_install() {
        let (ctx, buffer) = captured_primary();
        ctx.initialize().unwrap();
        ctx.initialize().unwrap();
        ctx.info("still captured");
        assert_eq!(buffer.lines().len(), 1);
    }

    #[test]
    fn subordinate_initialize_is_noop() {
        let ctx = LogContext::subordinate(SubordinateId(5));
        ctx.initialize().unwrap();
        assert!(!ctx.is_initialized());
        assert!(!ctx.install_sink(LogSink::from_writer(Box::new(CaptureBuffer::new()), false)));
    }

    #[test]
    fn subordinate_without_forwarder_drops_quietly() {
        let ctx = LogContext::subordinate(SubordinateId(5));
        ctx.warn("dropped");
        assert!(ctx.forwarder().is_none());
    }

    #[test]
    fn role_is_fixed_for_clones() {
        let ctx = LogContext::subordinate(SubordinateId(12));
        let clone = ctx.clone();
        assert_eq!(clone.role(), Role::Subordinate(SubordinateId(12)));
        assert!(!clone.is_primary());
    }
}
