//! Structured-output contracts for the timestamp tasks.

use serde::Deserialize;
use serde_json::{json, Value};

/// Which shape of `timestamp` field the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    /// Zero or more `{start_time, end_time}` pairs.
    Highlights,
    /// At most one `{start_time, end_time}` pair.
    Moment,
}

impl OutputSchema {
    /// The `responseSchema` sent with a structured request.
    pub fn to_json(self) -> Value {
        let timestamp = match self {
            OutputSchema::Highlights => json!({
                "type": "ARRAY",
                "description": "List of timestamps of the key moments, if any.",
                "items": timestamp_pair()
            }),
            OutputSchema::Moment => {
                let mut pair = timestamp_pair();
                pair["description"] = json!("Timestamp of the moment/incident");
                pair["nullable"] = json!(true);
                pair
            }
        };

        json!({
            "type": "OBJECT",
            "properties": { "timestamp": timestamp }
        })
    }
}

fn timestamp_pair() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "start_time": {
                "type": "STRING",
                "description": "Start timestamp of the segment. Strictly follow HH:MM:SS format. For example, '00:10:23'"
            },
            "end_time": {
                "type": "STRING",
                "description": "End timestamp of the segment. Strictly follow HH:MM:SS format. For example, '00:13:56'"
            }
        },
        "required": ["start_time", "end_time"]
    })
}

/// One candidate as the model wrote it, before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawTimestamp {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum TimestampField {
    Many(Vec<RawTimestamp>),
    One(RawTimestamp),
}

/// The decoded JSON reply of a structured call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StructuredQueryResult {
    #[serde(default)]
    timestamp: Option<TimestampField>,
}

impl StructuredQueryResult {
    /// Normalize the `timestamp` field: absent or empty gives nothing,
    /// a single object gives one candidate, a list is kept as is.
    pub fn into_candidates(self) -> Vec<RawTimestamp> {
        match self.timestamp {
            None => Vec::new(),
            Some(TimestampField::One(ts)) => vec![ts],
            Some(TimestampField::Many(list)) => list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Vec<RawTimestamp> {
        serde_json::from_str::<StructuredQueryResult>(json)
            .unwrap()
            .into_candidates()
    }

    #[test]
    fn test_absent_and_null_timestamp() {
        assert!(decode("{}").is_empty());
        assert!(decode(r#"{"timestamp": null}"#).is_empty());
        assert!(decode(r#"{"timestamp": []}"#).is_empty());
    }

    #[test]
    fn test_single_object_becomes_one_candidate() {
        let candidates =
            decode(r#"{"timestamp": {"start_time": "00:00:05", "end_time": "00:00:09"}}"#);
        assert_eq!(
            candidates,
            vec![RawTimestamp {
                start_time: "00:00:05".to_string(),
                end_time: "00:00:09".to_string(),
            }]
        );
    }

    #[test]
    fn test_list_keeps_order() {
        let candidates = decode(
            r#"{"timestamp": [
                {"start_time": "00:01:00", "end_time": "00:01:10"},
                {"start_time": "00:00:05", "end_time": "00:00:09"}
            ]}"#,
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start_time, "00:01:00");
        assert_eq!(candidates[1].start_time, "00:00:05");
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(serde_json::from_str::<StructuredQueryResult>(r#"{"timestamp": "00:01"}"#).is_err());
        assert!(
            serde_json::from_str::<StructuredQueryResult>(r#"{"timestamp": [{"start": 1}]}"#)
                .is_err()
        );
    }

    #[test]
    fn test_schemas_differ_in_cardinality() {
        let highlights = OutputSchema::Highlights.to_json();
        assert_eq!(highlights["properties"]["timestamp"]["type"], "ARRAY");

        let moment = OutputSchema::Moment.to_json();
        assert_eq!(moment["properties"]["timestamp"]["type"], "OBJECT");
        assert_eq!(moment["properties"]["timestamp"]["nullable"], true);
    }
}
