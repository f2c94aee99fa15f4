use super::attributes::{tags_from_json, tags_to_json};
use super::{parse_json_list, CodecError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use span_model::Log;

/// Encodes logs as `[[rfc3339_nanos_timestamp, [tag triples...]], ...]`.
///
/// Timestamps always carry nine fractional digits and a `Z` suffix so that
/// their textual order matches their chronological order.
pub fn encode_logs(logs: &[Log]) -> Result<Vec<u8>, CodecError> {
    let mut entries = Vec::with_capacity(logs.len());
    for (idx, log) in logs.iter().enumerate() {
        let fields = tags_to_json(&log.fields)
            .map_err(|e| CodecError::event_caused_by(format!("fields of log #{idx}"), e))?;
        entries.push(JsonValue::Array(vec![
            JsonValue::String(format_timestamp(log.timestamp)),
            fields,
        ]));
    }
    serde_json::to_vec(&entries).map_err(|e| CodecError::event_caused_by("serializing logs", e))
}

pub fn decode_logs(raw: &[u8]) -> Result<Vec<Log>, CodecError> {
    let entries = parse_json_list(raw, "decoding logs json")
        .map_err(|e| CodecError::event_caused_by("logs are not a json array", e))?;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| log_from_json(idx, entry))
        .collect()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn log_from_json(idx: usize, entry: &JsonValue) -> Result<Log, CodecError> {
    let (timestamp, fields) = match entry.as_array().map(Vec::as_slice) {
        Some([timestamp, fields]) => (timestamp, fields),
        _ => {
            return Err(CodecError::event(format!(
                "log #{idx} is not a [timestamp, fields] pair"
            )))
        }
    };
    let timestamp = timestamp
        .as_str()
        .ok_or_else(|| CodecError::event(format!("log #{idx} timestamp is not a string")))?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| {
            CodecError::event_caused_by(format!("log #{idx} has bad timestamp {timestamp:?}"), e)
        })?
        .with_timezone(&Utc);
    let fields = match fields {
        JsonValue::Array(fields) => tags_from_json(fields)
            .map_err(|e| CodecError::event_caused_by(format!("fields of log #{idx}"), e))?,
        JsonValue::Null => vec![],
        _ => {
            return Err(CodecError::event(format!(
                "log #{idx} fields are not an array"
            )))
        }
    };
    Ok(Log { timestamp, fields })
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use span_model::KeyValue;

    fn log_at(secs: i64, nanos: u32, fields: Vec<KeyValue>) -> Log {
        Log {
            timestamp: Utc.timestamp_opt(secs, nanos).unwrap(),
            fields,
        }
    }

    #[test]
    fn encoded_form_embeds_tag_triples() {
        let logs = vec![
            log_at(1_700_000_000, 5, vec![KeyValue::string("event", "retry")]),
            log_at(1_700_000_001, 0, vec![]),
        ];
        let encoded = encode_logs(&logs).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(encoded).unwrap(),
            @r###"[["2023-11-14T22:13:20.000000005Z",[["event",0,"retry"]]],["2023-11-14T22:13:21.000000000Z",[]]]"###
        );
    }

    #[test]
    fn logs_survive_encoding_with_nanos() {
        let logs = vec![
            log_at(
                1_600_000_000,
                123_456_789,
                vec![KeyValue::bool("foo", false), KeyValue::int64("attempt", 3)],
            ),
            log_at(0, 0, vec![KeyValue::binary("raw", vec![0xff])]),
        ];
        assert_eq!(decode_logs(&encode_logs(&logs).unwrap()).unwrap(), logs);
    }

    #[test]
    fn empty_logs_stay_an_empty_list() {
        assert_eq!(encode_logs(&[]).unwrap(), b"[]");
        assert_eq!(decode_logs(b"[]").unwrap(), vec![]);
        assert_eq!(decode_logs(b"null").unwrap(), vec![]);
    }

    #[test]
    fn timestamps_with_offsets_are_accepted() {
        let decoded = decode_logs(br#"[["2023-11-14T23:13:20.5+01:00",[]]]"#).unwrap();
        assert_eq!(
            decoded[0].timestamp,
            Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap()
        );
    }

    #[test]
    fn malformed_logs_are_rejected() {
        for raw in [
            r#"[["yesterday",[]]]"#,
            r#"[[12,[]]]"#,
            r#"[["2023-11-14T22:13:20Z"]]"#,
            r#"[["2023-11-14T22:13:20Z",[["k",7,"v"]]]]"#,
            r#"[["2023-11-14T22:13:20Z",{}]]"#,
            r#"{}"#,
        ] {
            let err = decode_logs(raw.as_bytes()).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedEvent { .. }),
                "{raw} gave {err:?}"
            );
        }
    }
}
