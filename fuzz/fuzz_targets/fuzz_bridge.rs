//! Fuzz target for the aggregator bridge.
//!
//! Feeds arbitrary frames to `on_subordinate_event` on a primary with an
//! in-memory sink.

#![no_main]

use std::sync::OnceLock;

use clusterlog::{Aggregator, LogContext, LogSink, SinkConfig, SubordinateId};
use libfuzzer_sys::fuzz_target;

fn aggregator() -> &'static Aggregator {
    static AGGREGATOR: OnceLock<Aggregator> = OnceLock::new();
    AGGREGATOR.get_or_init(|| {
        let ctx = LogContext::primary(SinkConfig::default());
        ctx.install_sink(LogSink::from_writer(Box::new(std::io::sink()), false));
        Aggregator::new(ctx).expect("primary context")
    })
}

fuzz_target!(|data: &[u8]| {
    let _ = aggregator().on_subordinate_event(SubordinateId(1), data);
});
