use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Consolidated field mapping for one sampling instant, as sent to the sink.
pub type Record = BTreeMap<String, serde_json::Value>;

/// One decoded notification payload.
///
/// The backend publishers are not consistent about field names, so the
/// correlation key and sensor id accept the spellings seen in production
/// payloads (`tiempo`/`timestamp`, `sensor`).
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    #[serde(
        default,
        alias = "tiempo",
        alias = "timestamp",
        alias = "ts",
        deserialize_with = "key_as_string"
    )]
    pub correlation_key: Option<String>,
    #[serde(default, alias = "sensor", alias = "tag")]
    pub sensor_id: Option<String>,
    #[serde(alias = "valor")]
    pub value: serde_json::Value,
}

/// Correlation keys arrive as strings or bare numbers (epoch seconds);
/// normalize both to strings. Anything else counts as missing.
fn key_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_canonical_payload() {
        let reading: Reading =
            serde_json::from_str(r#"{"correlation_key":"2025-03-01T10:00:00","sensor_id":"s1","value":4.2}"#)
                .unwrap();
        assert_eq!(reading.correlation_key.as_deref(), Some("2025-03-01T10:00:00"));
        assert_eq!(reading.sensor_id.as_deref(), Some("s1"));
        assert_eq!(reading.value, serde_json::json!(4.2));
    }

    #[test]
    fn test_decode_spanish_aliases() {
        let reading: Reading =
            serde_json::from_str(r#"{"tiempo":"2025-03-01T10:00:00","sensor":"PT-101","valor":"12.5"}"#)
                .unwrap();
        assert_eq!(reading.correlation_key.as_deref(), Some("2025-03-01T10:00:00"));
        assert_eq!(reading.sensor_id.as_deref(), Some("PT-101"));
    }

    #[test]
    fn test_numeric_key_normalized_to_string() {
        let reading: Reading =
            serde_json::from_str(r#"{"timestamp":1740842400,"value":1}"#).unwrap();
        assert_eq!(reading.correlation_key.as_deref(), Some("1740842400"));
    }

    #[test]
    fn test_missing_key_is_none() {
        let reading: Reading = serde_json::from_str(r#"{"value":1}"#).unwrap();
        assert!(reading.correlation_key.is_none());
    }
}
