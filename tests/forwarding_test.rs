//! End-to-end forwarding tests.
//!
//! A subordinate `LogContext` forwards through a real forwarder task into
//! `AggregatorServer::handle_connection`, connected by `tokio::io::duplex`
//! instead of an OS socket.

use clusterlog::ipc::{spawn_forwarder, AggregatorServer, ForwarderConfig, ServerConfig};
use clusterlog::sink::CaptureBuffer;
use clusterlog::{Aggregator, LogContext, LogLevel, LogSink, SinkConfig, SubordinateId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn primary() -> (LogContext, AggregatorServer, CaptureBuffer) {
    let ctx = LogContext::primary(SinkConfig::default());
    let buffer = CaptureBuffer::new();
    assert!(ctx.install_sink(LogSink::from_writer(Box::new(buffer.clone()), false)));
    let aggregator = Aggregator::new(ctx.clone()).unwrap();
    let server = AggregatorServer::new(aggregator, ServerConfig::default());
    (ctx, server, buffer)
}

/// Run `emit` in a subordinate with the given id and wait until the primary
/// has read everything it sent.
async fn run_subordinate<F>(server: &AggregatorServer, id: u32, emit: F)
where
    F: FnOnce(&LogContext),
{
    let id = SubordinateId(id);
    let (client, conn) = tokio::io::duplex(64 * 1024);

    let reader = tokio::spawn({
        let server = server.clone();
        async move { server.handle_connection(conn).await }
    });

    let ctx = LogContext::subordinate(id);
    let (forwarder, handle) = spawn_forwarder(client, id, &ForwarderConfig::default());
    assert!(ctx.attach_forwarder(forwarder));
    emit(&ctx);

    let report = handle.close().await;
    assert!(!report.connection_failed);
    assert_eq!(reader.await.unwrap().unwrap(), id);
}

/// Strip the `[timestamp] ` part of a sink line.
fn body(line: &str) -> &str {
    line.split_once("] ").map(|(_, rest)| rest).unwrap_or(line)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn warn_from_subordinate_is_prefixed() {
    let (_ctx, server, buffer) = primary();
    run_subordinate(&server, 4321, |ctx| ctx.warn("slow response")).await;

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(body(&lines[0]), "[WARN] - (#4321) slow response");
}

#[tokio::test]
async fn subordinate_never_writes_locally() {
    let (_ctx, server, buffer) = primary();
    let local = CaptureBuffer::new();
    run_subordinate(&server, 7, |ctx| {
        // A subordinate refuses a sink, so nothing can land in `local`.
        assert!(!ctx.install_sink(LogSink::from_writer(Box::new(local.clone()), false)));
        ctx.error("boom");
    })
    .await;

    assert!(local.lines().is_empty());
    assert_eq!(body(&buffer.lines()[0]), "[ERROR] - (#7) boom");
}

#[tokio::test]
async fn per_subordinate_order_is_kept() {
    let (_ctx, server, buffer) = primary();
    run_subordinate(&server, 12, |ctx| {
        for n in 0..200 {
            ctx.info(format!("event {n}"));
        }
    })
    .await;

    let lines = buffer.lines();
    assert_eq!(lines.len(), 200);
    for (n, line) in lines.iter().enumerate() {
        assert_eq!(body(line), format!("[INFO] - (#12) event {n}"));
    }
}

#[tokio::test]
async fn all_levels_round_trip() {
    let (_ctx, server, buffer) = primary();
    run_subordinate(&server, 3, |ctx| {
        for level in LogLevel::ALL {
            ctx.log(level, level.as_str());
        }
    })
    .await;

    let bodies: Vec<_> = buffer.lines().iter().map(|l| body(l).to_string()).collect();
    assert_eq!(
        bodies,
        vec![
            "[ERROR] - (#3) error",
            "[WARN] - (#3) warn",
            "[INFO] - (#3) info",
            "[DEBUG] - (#3) debug",
        ]
    );
}

#[tokio::test]
async fn primary_and_subordinate_lines_share_the_sink() {
    let (ctx, server, buffer) = primary();
    ctx.info("primary up");
    run_subordinate(&server, 9, |sub| sub.debug("worker up")).await;
    ctx.info("primary down");

    let bodies: Vec<_> = buffer.lines().iter().map(|l| body(l).to_string()).collect();
    assert_eq!(
        bodies,
        vec![
            "[INFO] - primary up",
            "[DEBUG] - (#9) worker up",
            "[INFO] - primary down",
        ]
    );
}

#[tokio::test]
async fn concurrent_subordinates_keep_their_own_order() {
    let (_ctx, server, buffer) = primary();

    let a = run_subordinate(&server, 1, |ctx| {
        for n in 0..50 {
            ctx.info(format!("a{n}"));
        }
    });
    let b = run_subordinate(&server, 2, |ctx| {
        for n in 0..50 {
            ctx.info(format!("b{n}"));
        }
    });
    tokio::join!(a, b);

    let lines = buffer.lines();
    assert_eq!(lines.len(), 100);
    for (prefix, tag) in [("(#1) ", 'a'), ("(#2) ", 'b')] {
        let seen: Vec<String> = lines
            .iter()
            .filter_map(|l| body(l).strip_prefix("[INFO] - "))
            .filter_map(|m| m.strip_prefix(prefix))
            .map(str::to_string)
            .collect();
        let expected: Vec<String> = (0..50).map(|n| format!("{tag}{n}")).collect();
        assert_eq!(seen, expected);
    }
    assert_eq!(server.aggregator().stats().forwarded, 100);
    assert_eq!(server.aggregator().stats().active_subordinates, 0);
}

#[tokio::test]
async fn uninitialized_primary_drops_forwarded_events() {
    let ctx = LogContext::primary(SinkConfig::default());
    let aggregator = Aggregator::new(ctx).unwrap();
    let server = AggregatorServer::new(aggregator, ServerConfig::default());

    run_subordinate(&server, 5, |sub| sub.info("into the void")).await;

    // The event was claimed, there was just nowhere to write it.
    assert_eq!(server.aggregator().stats().forwarded, 1);
}
