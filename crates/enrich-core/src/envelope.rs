//! Parsed form of a broker record's value (§3 Envelope).
//!
//! Represented as a generic JSON tree rather than a fixed struct: the buffer
//! path's inner key segment (`object.<lowercased objectType>.buffer`) is
//! data-dependent, so a fixed schema can't name it (§9).

use serde_json::Value;
use thiserror::Error;

/// The textual marker that identifies a heartbeat record without needing a
/// full JSON parse. Checked against the raw record value bytes.
const NULL_BUFFER_MARKER: &str = "\"buffer\" : null";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("@timestamp does not match the expected ISO-8601 format: {0}")]
    Timestamp(String),
}

/// Parsed JSON document for a data record.
#[derive(Debug, Clone)]
pub struct Envelope(Value);

impl Envelope {
    /// Parse a record's raw JSON value bytes into an `Envelope`.
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Envelope(serde_json::from_slice(raw)?))
    }

    pub fn object_type(&self) -> Result<&str, EnvelopeError> {
        self.0
            .get("objectType")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("objectType"))
    }

    pub fn object_id(&self) -> Result<&str, EnvelopeError> {
        self.0
            .get("object")
            .and_then(|o| o.get("id"))
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("object.id"))
    }

    pub fn sensor_id(&self) -> Result<&str, EnvelopeError> {
        self.0
            .get("sensor")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("sensor.id"))
    }

    pub fn timestamp(&self) -> Result<&str, EnvelopeError> {
        self.0
            .get("@timestamp")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("@timestamp"))
    }

    /// The epoch (seconds, millisecond-fraction) pair derived from `@timestamp`.
    pub fn epoch_timestamp(&self) -> Result<(i64, i64), EnvelopeError> {
        split_epoch_timestamp(self.timestamp()?)
    }

    /// Replace `object.<lowercased objectType>.buffer` with `image`, leaving
    /// every other field untouched.
    pub fn with_image(&self, image: &str) -> Result<Value, EnvelopeError> {
        let object_type = self.object_type()?.to_ascii_lowercase();
        let mut copy = self.0.clone();
        let buffer = copy
            .get_mut("object")
            .and_then(|o| o.get_mut(&object_type))
            .and_then(|t| t.get_mut("buffer"))
            .ok_or(EnvelopeError::MissingField("object.<objectType>.buffer"))?;
        *buffer = Value::String(image.to_owned());
        Ok(copy)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Whether the raw (unparsed) record value carries the null-buffer heartbeat
/// marker. Checked before attempting a JSON parse, matching the original's
/// `'"buffer" : null' in message.decode()` substring test.
pub fn is_heartbeat(raw: &[u8]) -> bool {
    std::str::from_utf8(raw).is_ok_and(|s| s.contains(NULL_BUFFER_MARKER))
}

/// Split an ISO-8601 timestamp (`YYYY-MM-DDTHH:MM:SS.mmmZ`) into
/// (integer seconds since epoch, millisecond fraction).
pub fn split_epoch_timestamp(iso8601: &str) -> Result<(i64, i64), EnvelopeError> {
    use chrono::{NaiveDateTime, Timelike};

    let dt = NaiveDateTime::parse_from_str(iso8601, "%Y-%m-%dT%H:%M:%S%.3fZ")
        .map_err(|e| EnvelopeError::Timestamp(format!("{iso8601}: {e}")))?;
    let time_sec = dt.and_utc().timestamp();
    let fraction = i64::from(dt.and_utc().nanosecond() / 1_000_000);
    Ok((time_sec, fraction))
}

/// Recombine a (seconds, millisecond fraction) pair back into an ISO-8601
/// timestamp. Used only to validate the round-trip law in tests.
pub fn join_epoch_timestamp(time_sec: i64, fraction: i64) -> Option<String> {
    use chrono::DateTime;

    let dt = DateTime::from_timestamp(time_sec, u32::try_from(fraction).ok()? * 1_000_000)?;
    Some(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_marker_detected() {
        let raw = br#"{"@timestamp":"2023-02-21T14:47:52.079Z","objectType":"VEHICLE","object":{"vehicle":{"buffer" : null}}}"#;
        assert!(is_heartbeat(raw));
    }

    #[test]
    fn non_heartbeat_not_detected() {
        let raw = br#"{"object":{"vehicle":{"buffer":"prev"}}}"#;
        assert!(!is_heartbeat(raw));
    }

    #[test]
    fn splits_millisecond_fraction() {
        let (sec, frac) = split_epoch_timestamp("2023-02-21T14:47:52.079Z").unwrap();
        assert_eq!(sec, 1_676_990_872);
        assert_eq!(frac, 79);
    }

    #[test]
    fn round_trips_through_split_and_join() {
        let original = "2023-02-21T14:47:52.079Z";
        let (sec, frac) = split_epoch_timestamp(original).unwrap();
        assert_eq!(join_epoch_timestamp(sec, frac).unwrap(), original);
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(split_epoch_timestamp("not-a-timestamp").is_err());
    }

    #[test]
    fn with_image_replaces_only_buffer_path() {
        let raw = br#"{"@timestamp":"2023-02-21T14:47:52.079Z","objectType":"VEHICLE","object":{"id":"o1","vehicle":{"buffer":"prev"}},"sensor":{"id":"s1"}}"#;
        let env = Envelope::parse(raw).unwrap();
        let enriched = env.with_image("abc").unwrap();
        assert_eq!(enriched["object"]["vehicle"]["buffer"], "abc");
        assert_eq!(enriched["object"]["id"], "o1");
        assert_eq!(enriched["sensor"]["id"], "s1");
    }
}
