//! Wire protocol and bridge tests.

use clusterlog::ipc::{
    decode_envelope, encode_envelope, ControlMessage, Envelope, Hello, LogRecord, ProtocolError,
};
use clusterlog::sink::CaptureBuffer;
use clusterlog::{
    Aggregator, AggregatorError, LogContext, LogEvent, LogLevel, LogSink, SinkConfig,
    SubordinateId,
};

const MAX: usize = 64 * 1024;

fn aggregator() -> (Aggregator, CaptureBuffer) {
    let ctx = LogContext::primary(SinkConfig::default());
    let buffer = CaptureBuffer::new();
    ctx.install_sink(LogSink::from_writer(Box::new(buffer.clone()), false));
    (Aggregator::new(ctx).unwrap(), buffer)
}

#[test]
fn encoded_log_is_claimed_by_aggregator() {
    let (agg, buffer) = aggregator();
    let event = LogEvent::new(LogLevel::Error, "disk full");
    let frame = encode_envelope(&Envelope::log(&event), MAX).unwrap();

    assert!(agg.on_subordinate_event(SubordinateId(42), &frame));
    assert!(buffer.lines()[0].ends_with("[ERROR] - (#42) disk full"));
}

#[test]
fn every_level_is_recognized() {
    let (agg, buffer) = aggregator();
    for level in ["error", "warn", "info", "debug"] {
        let raw = format!(r#"{{"kind":"log","payload":{{"level":"{level}","message":"m"}}}}"#);
        assert!(agg.on_subordinate_event(SubordinateId(1), raw.as_bytes()), "{level}");
    }
    assert_eq!(buffer.lines().len(), 4);
}

#[test]
fn unrecognized_payloads_are_left_alone() {
    let (agg, buffer) = aggregator();
    let id = SubordinateId(1);
    let cases: &[&[u8]] = &[
        br#"{"kind":"log","payload":{"level":"WARN","message":"m"}}"#,
        br#"{"kind":"log","payload":{"level":"trace","message":"m"}}"#,
        br#"{"kind":"log","payload":{"message":"m"}}"#,
        br#"{"kind":"control","payload":{"name":"stop"}}"#,
        br#"{"kind":"hello","payload":{"subordinate_id":1}}"#,
        br#"{"kind":"heartbeat","payload":{}}"#,
        br#"{"log":"error","message":"legacy shape"}"#,
        b"",
        b"\xff\xfe",
    ];
    for raw in cases {
        assert!(!agg.on_subordinate_event(id, raw));
    }
    assert!(buffer.lines().is_empty());

    let stats = agg.stats();
    assert_eq!(stats.dropped_malformed, 3);
    assert_eq!(stats.unhandled, 6);
    assert_eq!(stats.forwarded, 0);
}

#[test]
fn log_frames_without_usable_fields_are_malformed() {
    let (agg, buffer) = aggregator();
    let id = SubordinateId(1);
    let cases: &[&[u8]] = &[
        br#"{"kind":"log","payload":{"level":"info"}}"#,
        br#"{"kind":"log","payload":{"level":"info","message":null}}"#,
        br#"{"kind":"log","payload":{"level":5,"message":"x"}}"#,
        br#"{"kind":"log","payload":{"level":["warn"],"message":"x"}}"#,
    ];
    for raw in cases {
        assert!(!agg.on_subordinate_event(id, raw));
    }
    assert!(buffer.lines().is_empty());

    let stats = agg.stats();
    assert_eq!(stats.dropped_malformed, 4);
    assert_eq!(stats.unhandled, 0);
    assert_eq!(stats.forwarded, 0);
}

#[test]
fn empty_string_message_is_still_forwarded() {
    let (agg, buffer) = aggregator();
    let raw = br#"{"kind":"log","payload":{"level":"info","message":""}}"#;
    assert!(agg.on_subordinate_event(SubordinateId(9), raw));
    assert!(buffer.lines()[0].ends_with("[INFO] - (#9) "));
}

#[test]
fn aggregator_needs_primary() {
    let err = Aggregator::new(LogContext::subordinate(SubordinateId(1))).unwrap_err();
    assert_eq!(err, AggregatorError::NotPrimary("subordinate".to_string()));
}

#[test]
fn envelope_kinds() {
    assert_eq!(Envelope::Hello(Hello::new(SubordinateId(1))).kind(), "hello");
    assert_eq!(
        Envelope::Log(LogRecord {
            level: None,
            message: None
        })
        .kind(),
        "log"
    );
    assert_eq!(
        Envelope::Control(ControlMessage {
            name: "x".into(),
            data: serde_json::Value::Null
        })
        .kind(),
        "control"
    );
}

#[test]
fn control_round_trip_keeps_data() {
    let message = Envelope::Control(ControlMessage {
        name: "resize".into(),
        data: serde_json::json!({"workers": 4}),
    });
    let bytes = encode_envelope(&message, MAX).unwrap();
    assert_eq!(decode_envelope(&bytes, MAX).unwrap(), message);
}

#[test]
fn oversize_frames_rejected() {
    let big = LogEvent::new(LogLevel::Info, "x".repeat(MAX));
    assert!(matches!(
        encode_envelope(&Envelope::log(&big), MAX),
        Err(ProtocolError::MessageTooLarge { .. })
    ));
}
