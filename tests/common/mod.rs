//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use livesort_rs::{
    EngineConfig, Event, EventSet, FieldKind, RawBuffer, Result, RowWriter, Schema, SortError,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Install a log subscriber once; run with RUST_LOG=debug to see engine
/// activity during a failing test
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Engine config with intervals shrunk for fast test runs
pub fn fast_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        file_retry_ms: 5,
        online_poll_ms: 2,
        stop_poll_ms: 1,
        monitor_capacity: 4096,
    }
}

/// Little-endian f64 payload for the energy unpacker
pub fn f64_payload(value: f64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Event set with one event type (tag 1, field `e: f64`)
///
/// The unpacker reads a little-endian f64 payload and rejects anything
/// shorter than 8 bytes.
pub fn energy_events() -> (EventSet, Arc<Event>) {
    let mut schema = Schema::new();
    let e = schema.register("e", FieldKind::F64).unwrap();
    let mut events = EventSet::new();
    let event = events
        .register_event(
            1,
            "physics",
            schema,
            Box::new(move |payload: &[u8], row: &mut RowWriter<'_>| -> Result<()> {
                let bytes: [u8; 8] = payload
                    .get(0..8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| SortError::Read("payload shorter than 8 bytes".to_string()))?;
                row.set(e, f64::from_le_bytes(bytes))
            }),
        )
        .unwrap();
    (events, event)
}

/// Write a frame file of tag-1 energy events
pub fn write_energy_file(path: &Path, values: &[f64]) {
    let mut file = std::fs::File::create(path).unwrap();
    for value in values {
        livesort_rs::source::write_frame(&mut file, &RawBuffer::new(1, f64_payload(*value)))
            .unwrap();
    }
}

/// Poll a condition until it holds or the timeout expires
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
