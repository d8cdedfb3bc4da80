//! Subordinate side of the forwarding channel.
//!
//! [`Forwarder::send`] encodes the event on the caller's thread and hands
//! the frame to a bounded queue with `try_send`; a background task writes
//! queued frames to the primary in order. A full queue, a closed queue or
//! a dead connection drops the event. Nothing is retried and nothing is
//! acknowledged, so a log call can never stall on the primary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::endpoint;
use super::framing::{write_frame, ChannelError};
use super::protocol::{encode_envelope, ControlMessage, Envelope, Hello, ProtocolError};
use crate::config::{DEFAULT_FRAME_LIMIT, DEFAULT_QUEUE_CAPACITY};
use crate::event::{LogEvent, SubordinateId};
use crate::telemetry::diag::{self, Diagnostic};

/// Forwarder tuning.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub queue_capacity: usize,
    pub max_frame_size: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_size: DEFAULT_FRAME_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
struct ForwarderStats {
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Sending half, held by the subordinate's [`crate::LogContext`].
#[derive(Clone, Debug)]
pub struct Forwarder {
    tx: mpsc::Sender<Vec<u8>>,
    max_frame_size: usize,
    stats: Arc<ForwarderStats>,
}

impl Forwarder {
    /// Queue a log event for the primary. Never blocks.
    pub fn send(&self, event: &LogEvent) {
        self.enqueue(&Envelope::log(event));
    }

    /// Queue a non-log message. Returns whether it was queued.
    pub fn send_control(&self, name: impl Into<String>, data: serde_json::Value) -> bool {
        self.enqueue(&Envelope::Control(ControlMessage {
            name: name.into(),
            data,
        }))
    }

    fn enqueue(&self, envelope: &Envelope) -> bool {
        let frame = match encode_envelope(envelope, self.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                let kind = match e {
                    ProtocolError::MessageTooLarge { .. } => Diagnostic::FrameTooLarge,
                    _ => Diagnostic::TransportWrite,
                };
                self.drop_one(kind, &e);
                return false;
            }
        };

        match self.tx.try_send(frame) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.drop_one(Diagnostic::QueueFull, &"forwarding queue full, log event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.drop_one(
                    Diagnostic::ChannelClosed,
                    &"forwarding channel closed, log event dropped",
                );
                false
            }
        }
    }

    fn drop_one(&self, kind: Diagnostic, detail: &dyn std::fmt::Display) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        diag::report(kind, detail);
    }

    /// Frames accepted into the queue so far.
    pub fn queued(&self) -> u64 {
        self.stats.queued.load(Ordering::Relaxed)
    }

    /// Events lost before reaching the queue.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

/// Outcome of the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForwarderReport {
    /// Frames written after the hello frame.
    pub written: u64,
    /// Frames still queued when the connection failed.
    pub abandoned: u64,
    pub connection_failed: bool,
}

/// Owner handle for the writer task.
#[derive(Debug)]
pub struct ForwarderHandle {
    shutdown: CancellationToken,
    task: JoinHandle<ForwarderReport>,
}

impl ForwarderHandle {
    /// Write whatever is still queued, close the connection and stop.
    pub async fn close(self) -> ForwarderReport {
        self.shutdown.cancel();
        self.task.await.unwrap_or_else(|e| {
            tracing::warn!(target: diag::DIAG_TARGET, error = %e, "forwarder task failed");
            ForwarderReport {
                connection_failed: true,
                ..Default::default()
            }
        })
    }
}

/// Start forwarding over an already open stream.
pub fn spawn_forwarder<W>(
    writer: W,
    id: SubordinateId,
    config: &ForwarderConfig,
) -> (Forwarder, ForwarderHandle)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let shutdown = CancellationToken::new();
    let max_frame_size = config.max_frame_size;

    let task = tokio::spawn(writer_loop(writer, id, rx, shutdown.clone(), max_frame_size));

    let forwarder = Forwarder {
        tx,
        max_frame_size,
        stats: Arc::new(ForwarderStats::default()),
    };
    (forwarder, ForwarderHandle { shutdown, task })
}

/// Connect to the primary at `endpoint` and start forwarding.
pub async fn connect_forwarder(
    endpoint_name: &str,
    id: SubordinateId,
    config: &ForwarderConfig,
) -> Result<(Forwarder, ForwarderHandle), ChannelError> {
    let stream = endpoint::connect(endpoint_name).await?;
    Ok(spawn_forwarder(stream, id, config))
}

async fn writer_loop<W>(
    mut writer: W,
    id: SubordinateId,
    mut rx: mpsc::Receiver<Vec<u8>>,
    shutdown: CancellationToken,
    max_frame_size: usize,
) -> ForwarderReport
where
    W: AsyncWrite + Unpin,
{
    let mut report = ForwarderReport::default();

    let hello = encode_envelope(&Envelope::Hello(Hello::new(id)), max_frame_size);
    let hello_sent = match hello {
        Ok(frame) => write_frame(&mut writer, &frame, max_frame_size).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = hello_sent {
        diag::report(Diagnostic::TransportWrite, &e);
        report.connection_failed = true;
        report.abandoned = abandon(&mut rx);
        return report;
    }

    loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => frame,
            () = shutdown.cancelled() => {
                // Stop accepting, keep what is already queued.
                rx.close();
                rx.recv().await
            }
        };
        let Some(frame) = frame else { break };

        if let Err(e) = write_frame(&mut writer, &frame, max_frame_size).await {
            diag::report(Diagnostic::TransportWrite, &e);
            report.connection_failed = true;
            report.abandoned = 1 + abandon(&mut rx);
            return report;
        }
        report.written += 1;
    }

    let _ = writer.shutdown().await;
    report
}

/// Close the queue and count what was left in it.
fn abandon(rx: &mut mpsc::Receiver<Vec<u8>>) -> u64 {
    rx.close();
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}
