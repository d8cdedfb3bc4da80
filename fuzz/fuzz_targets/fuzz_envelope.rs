//! Fuzz target for envelope decoding.
//!
//! Arbitrary bytes parsed as a forwarding-channel frame must only ever
//! produce `Ok` or `Err`.

#![no_main]

use clusterlog::ipc::decode_envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_envelope(data, 1024 * 1024);
});
