//! Primary-side accept loop for the forwarding channel.
//!
//! One task per subordinate connection reads frames in arrival order and
//! hands them to the [`Aggregator`]. Frames the aggregator does not claim
//! are passed to an optional control inbox.

use std::sync::Arc;
use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::endpoint;
use super::framing::{read_frame, ChannelError};
use super::protocol::{decode_envelope, ControlMessage, Envelope, ProtocolError, PROTOCOL_VERSION};
use crate::aggregator::Aggregator;
use crate::config::{DEFAULT_FRAME_LIMIT, DEFAULT_MAX_SUBORDINATES, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use crate::event::SubordinateId;
use crate::telemetry::diag::{self, Diagnostic, DIAG_TARGET};

/// How long shutdown waits for each connection still in the listener backlog.
const BACKLOG_SWEEP_WAIT: Duration = Duration::from_millis(50);

/// Server limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_frame_size: usize,
    pub max_subordinates: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_FRAME_LIMIT,
            max_subordinates: DEFAULT_MAX_SUBORDINATES,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

/// How the connection tasks ended after shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: usize },
}

/// Receiver of non-log messages, tagged with the sending subordinate.
pub type ControlInbox = mpsc::Sender<(SubordinateId, ControlMessage)>;

/// Accepts subordinate connections and feeds them to an [`Aggregator`].
#[derive(Clone)]
pub struct AggregatorServer {
    aggregator: Aggregator,
    config: ServerConfig,
    control: Option<ControlInbox>,
    shutdown: CancellationToken,
    slots: Arc<Semaphore>,
}

impl AggregatorServer {
    pub fn new(aggregator: Aggregator, config: ServerConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_subordinates.max(1)));
        Self {
            aggregator,
            config,
            control: None,
            shutdown: CancellationToken::new(),
            slots,
        }
    }

    /// Create the server and start listening on `endpoint`.
    pub fn bind(
        endpoint_name: &str,
        aggregator: Aggregator,
        config: ServerConfig,
    ) -> Result<(Self, Listener), ChannelError> {
        let listener = endpoint::bind(endpoint_name)?;
        tracing::debug!(target: DIAG_TARGET, endpoint = endpoint_name, "aggregator listening");
        Ok((Self::new(aggregator, config), listener))
    }

    /// Forward unclaimed control messages to `inbox`. Full inboxes drop.
    pub fn with_control_inbox(mut self, inbox: ControlInbox) -> Self {
        self.control = Some(inbox);
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Token that stops the accept loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accept connections until shutdown, then drain.
    pub async fn serve(&self, listener: Listener) -> ShutdownResult {
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let stream = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => continue,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(target: DIAG_TARGET, error = %e, "accept failed");
                        continue;
                    }
                },
            };

            self.spawn_connection(&mut tasks, stream, permit);
        }

        self.sweep_backlog(&listener, &mut tasks).await;
        self.drain(tasks).await
    }

    fn spawn_connection(
        &self,
        tasks: &mut JoinSet<()>,
        stream: Stream,
        permit: OwnedSemaphorePermit,
    ) {
        let server = self.clone();
        tasks.spawn(async move {
            let _permit = permit;
            // Failures are already reported by handle_connection.
            let _ = server.handle_connection(stream).await;
        });
    }

    /// Take connections that completed before shutdown but were never
    /// accepted. Stops at the first quiet wait or when no slot is free.
    async fn sweep_backlog(&self, listener: &Listener, tasks: &mut JoinSet<()>) {
        let mut swept = 0usize;
        while let Ok(permit) = self.slots.clone().try_acquire_owned() {
            match tokio::time::timeout(BACKLOG_SWEEP_WAIT, listener.accept()).await {
                Ok(Ok(stream)) => {
                    self.spawn_connection(tasks, stream, permit);
                    swept += 1;
                }
                Ok(Err(_)) | Err(_) => break,
            }
        }
        if swept > 0 {
            tracing::debug!(target: DIAG_TARGET, swept, "accepted backlogged connections");
        }
    }

    async fn drain(&self, mut tasks: JoinSet<()>) -> ShutdownResult {
        let finished = tokio::time::timeout(self.config.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match finished {
            Ok(()) => ShutdownResult::Complete,
            Err(_) => {
                let remaining = tasks.len();
                tracing::warn!(
                    target: DIAG_TARGET,
                    remaining,
                    "subordinate connections still open after shutdown timeout, aborting"
                );
                tasks.shutdown().await;
                ShutdownResult::Timeout { remaining }
            }
        }
    }

    /// Run one connection to completion: hello, frames, deregistration.
    ///
    /// Returns the subordinate id once the peer closes the connection.
    pub async fn handle_connection<R>(&self, mut reader: R) -> Result<SubordinateId, ChannelError>
    where
        R: AsyncRead + Unpin,
    {
        let max = self.config.max_frame_size;
        let id = match read_hello(&mut reader, max).await {
            Ok(id) => id,
            Err(e) => {
                diag::report(Diagnostic::HandshakeRejected, &e);
                return Err(e);
            }
        };

        let generation = self.aggregator.register(id);
        let result = self.receive(id, &mut reader).await;
        self.aggregator.unregister(id, generation);

        match result {
            Ok(()) => Ok(id),
            Err(e) => {
                if let ChannelError::Protocol(ProtocolError::MessageTooLarge { .. }) = e {
                    diag::report(Diagnostic::FrameTooLarge, &format_args!("subordinate {id}: {e}"));
                } else {
                    tracing::debug!(
                        target: DIAG_TARGET,
                        subordinate = id.0,
                        error = %e,
                        "connection ended"
                    );
                }
                Err(e)
            }
        }
    }

    async fn receive<R>(&self, id: SubordinateId, reader: &mut R) -> Result<(), ChannelError>
    where
        R: AsyncRead + Unpin,
    {
        let max = self.config.max_frame_size;
        while let Some(frame) = read_frame(reader, max).await? {
            if self.aggregator.on_subordinate_event(id, &frame) {
                continue;
            }
            if let Some(inbox) = &self.control {
                if let Ok(Envelope::Control(message)) = decode_envelope(&frame, max) {
                    let _ = inbox.try_send((id, message));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AggregatorServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorServer")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .field("free_slots", &self.slots.available_permits())
            .finish()
    }
}

async fn read_hello<R>(reader: &mut R, max: usize) -> Result<SubordinateId, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, max)
        .await?
        .ok_or_else(|| ChannelError::Handshake("connection closed before hello".into()))?;

    match decode_envelope(&frame, max)? {
        Envelope::Hello(hello) if hello.version == PROTOCOL_VERSION => {
            Ok(SubordinateId(hello.subordinate_id))
        }
        Envelope::Hello(hello) => Err(ChannelError::Handshake(format!(
            "unsupported protocol version {}",
            hello.version
        ))),
        other => Err(ChannelError::Handshake(format!(
            "expected hello, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogContext;
    use crate::ipc::framing::write_frame;
    use crate::ipc::protocol::{encode_envelope, Hello};
    use crate::sink::{CaptureBuffer, LogSink, SinkConfig};
    use tokio::io::AsyncWriteExt;

    const MAX: usize = 64 * 1024;

    fn server() -> (AggregatorServer, CaptureBuffer) {
        let ctx = LogContext::primary(SinkConfig::default());
        let buffer = CaptureBuffer::new();
        ctx.install_sink(LogSink::from_writer(Box::new(buffer.clone()), false));
        let aggregator = Aggregator::new(ctx).unwrap();
        (AggregatorServer::new(aggregator, ServerConfig::default()), buffer)
    }

    async fn send(writer: &mut tokio::io::DuplexStream, envelope: &Envelope) {
        let frame = encode_envelope(envelope, MAX).unwrap();
        write_frame(writer, &frame, MAX).await.unwrap();
    }

    #[tokio::test]
    async fn connection_without_hello_is_rejected() {
        let (server, buffer) = server();
        let (mut client, conn) = tokio::io::duplex(4096);
        send(
            &mut client,
            &Envelope::Log(crate::ipc::protocol::LogRecord {
                level: Some("info".into()),
                message: Some("too early".into()),
            }),
        )
        .await;
        drop(client);

        let err = server.handle_connection(conn).await.unwrap_err();
        assert!(matches!(err, ChannelError::Handshake(_)));
        assert!(buffer.lines().is_empty());
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let (server, _buffer) = server();
        let (mut client, conn) = tokio::io::duplex(4096);
        send(
            &mut client,
            &Envelope::Hello(Hello {
                subordinate_id: 1,
                version: PROTOCOL_VERSION + 1,
            }),
        )
        .await;
        drop(client);
        assert!(server.handle_connection(conn).await.is_err());
    }

    #[tokio::test]
    async fn control_messages_reach_inbox() {
        let (server, buffer) = server();
        let (tx, mut rx) = mpsc::channel(4);
        let server = server.with_control_inbox(tx);

        let (mut client, conn) = tokio::io::duplex(4096);
        send(&mut client, &Envelope::Hello(Hello::new(SubordinateId(8)))).await;
        send(
            &mut client,
            &Envelope::Control(ControlMessage {
                name: "restart".into(),
                data: serde_json::json!({"reason": "oom"}),
            }),
        )
        .await;
        drop(client);

        let id = server.handle_connection(conn).await.unwrap();
        assert_eq!(id, SubordinateId(8));
        let (from, message) = rx.recv().await.unwrap();
        assert_eq!(from, SubordinateId(8));
        assert_eq!(message.name, "restart");
        assert!(buffer.lines().is_empty());
        assert!(!server.aggregator().is_registered(SubordinateId(8)));
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let (server, _buffer) = server();
        let (mut client, conn) = tokio::io::duplex(4096);
        send(&mut client, &Envelope::Hello(Hello::new(SubordinateId(5)))).await;
        client.write_all(&u32::MAX.to_le_bytes()).await.unwrap();

        let err = server.handle_connection(conn).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Protocol(ProtocolError::MessageTooLarge { .. })
        ));
        assert!(!server.aggregator().is_registered(SubordinateId(5)));
    }
}
