//! Test message body
//!
//! Wire shape: `{ "message": string, "timestamp": ISO-8601 string, "testNumber": 0..1000 }`

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

/// Exclusive upper bound of the random test number
pub const TEST_NUMBER_RANGE: u16 = 1000;

/// Body of the test event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPayload {
    pub message: String,
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Utc>,
    pub test_number: u16,
}

impl TestPayload {
    /// Build a payload stamped `now` with a test number drawn from `rng`
    pub fn generate<R>(message: impl Into<String>, now: DateTime<Utc>, rng: &mut R) -> Self
    where
        R: Rng,
    {
        Self {
            message: message.into(),
            timestamp: now,
            test_number: rng.gen_range(0..TEST_NUMBER_RANGE),
        }
    }

    /// Build a payload stamped with the current time
    pub fn now<R>(message: impl Into<String>, rng: &mut R) -> Self
    where
        R: Rng,
    {
        Self::generate(message, Utc::now(), rng)
    }

    /// Indented JSON rendering for the console report
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// Millisecond precision with a `Z` suffix, e.g. 2024-01-01T00:00:00.000Z
fn serialize_millis<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_serializes_with_wire_field_names() {
        let payload = TestPayload {
            message: "hello".to_string(),
            timestamp: fixed_time(),
            test_number: 42,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": "hello",
                "timestamp": "2024-01-01T12:30:45.000Z",
                "testNumber": 42
            })
        );
    }

    #[test]
    fn test_same_seed_gives_same_payload() {
        let a = TestPayload::generate("m", fixed_time(), &mut StdRng::seed_from_u64(9));
        let b = TestPayload::generate("m", fixed_time(), &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_number_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..5000 {
            let payload = TestPayload::generate("m", fixed_time(), &mut rng);
            assert!(payload.test_number < TEST_NUMBER_RANGE);
        }
    }

    #[test]
    fn test_timestamp_parses_back() {
        let payload = TestPayload::now("m", &mut StdRng::seed_from_u64(3));
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: TestPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.timestamp.timestamp_millis(),
            payload.timestamp.timestamp_millis()
        );
    }

    #[test]
    fn test_pretty_json_is_indented() {
        let payload = TestPayload {
            message: "hello".to_string(),
            timestamp: fixed_time(),
            test_number: 7,
        };
        let pretty = payload.to_pretty_json().unwrap();
        assert!(pretty.starts_with("{\n  \"message\": \"hello\""));
        assert!(pretty.contains("\n  \"testNumber\": 7\n}"));
    }
}
