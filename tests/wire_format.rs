//! Wire format conformance tests
//!
//! Validates that the test message body and the batch frame match the
//! committed JSON fixtures in tests/fixtures/. Downstream triggers parse
//! exactly this shape.
//!
//! ## Fixture regeneration
//!
//! To regenerate fixtures after an intentional wire format change:
//! ```bash
//! REGENERATE_FIXTURES=1 cargo test --test wire_format
//! ```

use chrono::{TimeZone, Utc};
use hub_publisher::{EventBatch, EventData, TestPayload};
use serde_json::Value;
use std::path::PathBuf;

/// Fixture directory resolved via CARGO_MANIFEST_DIR.
fn fixtures_dir() -> PathBuf {
    let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    assert!(
        fixtures.exists(),
        "Fixture directory does not exist at {}",
        fixtures.display()
    );
    fixtures
}

fn read_fixture(name: &str) -> String {
    let path = fixtures_dir().join(format!("{name}.json"));
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {e}", path.display()))
}

/// Load a committed fixture by name (without .json extension).
fn load_fixture(name: &str) -> Value {
    serde_json::from_str(&read_fixture(name))
        .unwrap_or_else(|e| panic!("Failed to parse fixture {name}: {e}"))
}

/// Write a fixture to disk (for regeneration mode).
fn write_fixture(name: &str, rendered: &str) {
    let path = fixtures_dir().join(format!("{name}.json"));
    let content = format!("{rendered}\n");
    std::fs::write(&path, content)
        .unwrap_or_else(|e| panic!("Failed to write fixture {}: {e}", path.display()));
    eprintln!("Regenerated fixture: {}", path.display());
}

fn deterministic_payload() -> TestPayload {
    TestPayload {
        message: "Hello from test script - 1!".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        test_number: 42,
    }
}

fn deterministic_frame() -> Value {
    let mut batch = EventBatch::new("eh1", 1024);
    assert!(batch.try_add(EventData::from_body(&deterministic_payload()).unwrap()));
    serde_json::from_slice(&batch.to_frame()).unwrap()
}

/// Keys every message body carries, and nothing else.
const BODY_FIELDS: &[&str] = &["message", "timestamp", "testNumber"];

#[test]
fn rust_serialization_matches_committed_fixtures() {
    let regenerate = std::env::var("REGENERATE_FIXTURES").is_ok();

    // Rendered from the typed values so regenerated files keep field order
    let cases = [
        (
            "test-message",
            serde_json::to_value(deterministic_payload()).unwrap(),
            deterministic_payload().to_pretty_json().unwrap(),
        ),
        (
            "batch-frame",
            deterministic_frame(),
            serde_json::to_string_pretty(&[deterministic_payload()]).unwrap(),
        ),
    ];

    for (name, actual, rendered) in cases {
        if regenerate {
            write_fixture(name, &rendered);
        } else {
            assert_eq!(
                actual,
                load_fixture(name),
                "Wire format mismatch for fixture '{name}'. \
                 If intentional, run: REGENERATE_FIXTURES=1 cargo test --test wire_format"
            );
        }
    }
}

#[test]
fn console_rendering_matches_fixture_bytes() {
    let rendered = format!("{}\n", deterministic_payload().to_pretty_json().unwrap());
    assert_eq!(rendered, read_fixture("test-message"));
}

#[test]
fn message_fixture_has_exactly_the_body_fields() {
    let fixture = load_fixture("test-message");
    let obj = fixture.as_object().expect("fixture should be an object");

    let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    let mut expected = BODY_FIELDS.to_vec();
    expected.sort_unstable();
    assert_eq!(keys, expected);

    let test_number = obj["testNumber"].as_u64().expect("testNumber should be an integer");
    assert!(test_number < 1000);

    let timestamp = obj["timestamp"].as_str().expect("timestamp should be a string");
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .unwrap_or_else(|e| panic!("timestamp '{timestamp}' is not ISO-8601: {e}"));
}

#[test]
fn batch_frame_is_an_array_of_bodies() {
    let frame = load_fixture("batch-frame");
    let events = frame.as_array().expect("frame should be an array");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], load_fixture("test-message"));
}
