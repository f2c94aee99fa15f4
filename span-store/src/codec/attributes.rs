use super::{parse_json_list, CodecError};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde_json::Value as JsonValue;
use span_model::{KeyValue, Value, ValueType};

/// Encodes tags as `[[key, type_ordinal, value], ...]`.
///
/// Int64 values are written as decimal strings since JSON numbers lose
/// precision past 2^53, binary values as unpadded base64.
pub fn encode_tags(tags: &[KeyValue]) -> Result<Vec<u8>, CodecError> {
    let json = tags_to_json(tags)?;
    serde_json::to_vec(&json).map_err(|e| CodecError::attribute_caused_by("serializing tags", e))
}

pub fn decode_tags(raw: &[u8]) -> Result<Vec<KeyValue>, CodecError> {
    let entries = parse_json_list(raw, "decoding tags json")
        .map_err(|e| CodecError::attribute_caused_by("tags are not a json array", e))?;
    tags_from_json(&entries)
}

/// Unserialized form of [`encode_tags`], used to embed tags inside other documents.
pub(crate) fn tags_to_json(tags: &[KeyValue]) -> Result<JsonValue, CodecError> {
    let mut entries = Vec::with_capacity(tags.len());
    for kv in tags {
        let value = match &kv.value {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int64(i) => JsonValue::String(i.to_string()),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| {
                    CodecError::attribute(format!("tag {:?} has non-finite float {f}", kv.key))
                })?,
            Value::Binary(bytes) => JsonValue::String(STANDARD_NO_PAD.encode(bytes)),
        };
        entries.push(JsonValue::Array(vec![
            JsonValue::String(kv.key.clone()),
            JsonValue::from(kv.value.value_type().ordinal()),
            value,
        ]));
    }
    Ok(JsonValue::Array(entries))
}

/// Never returns `None` for an empty input, an empty list decodes to an empty `Vec`.
pub(crate) fn tags_from_json(entries: &[JsonValue]) -> Result<Vec<KeyValue>, CodecError> {
    entries.iter().map(tag_from_json).collect()
}

fn tag_from_json(entry: &JsonValue) -> Result<KeyValue, CodecError> {
    let [key, type_tag, value] = match entry.as_array().map(Vec::as_slice) {
        Some([key, type_tag, value]) => [key, type_tag, value],
        _ => {
            return Err(CodecError::attribute(format!(
                "expected a [key, type, value] triple, got {entry}"
            )))
        }
    };
    let key = key
        .as_str()
        .ok_or_else(|| CodecError::attribute(format!("tag key {key} is not a string")))?;
    let value_type = type_tag
        .as_i64()
        .and_then(ValueType::from_ordinal)
        .ok_or_else(|| CodecError::attribute(format!("tag {key:?} has unknown type {type_tag}")))?;
    let mismatch = || CodecError::attribute(format!("tag {key:?} has a bad {value_type:?} value {value}"));
    let value = match value_type {
        ValueType::String => Value::String(value.as_str().ok_or_else(mismatch)?.to_string()),
        ValueType::Bool => Value::Bool(value.as_bool().ok_or_else(mismatch)?),
        ValueType::Int64 => {
            let as_str = value.as_str().ok_or_else(mismatch)?;
            Value::Int64(as_str.parse::<i64>().map_err(|e| {
                CodecError::attribute_caused_by(format!("tag {key:?} has a bad int64 {as_str:?}"), e)
            })?)
        }
        ValueType::Float64 => Value::Float64(value.as_f64().ok_or_else(mismatch)?),
        ValueType::Binary => {
            let as_str = value.as_str().ok_or_else(mismatch)?;
            Value::Binary(STANDARD_NO_PAD.decode(as_str).map_err(|e| {
                CodecError::attribute_caused_by(format!("tag {key:?} has bad base64"), e)
            })?)
        }
    };
    Ok(KeyValue {
        key: key.to_string(),
        value,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn all_types() -> Vec<KeyValue> {
        vec![
            KeyValue::string("http.method", "GET"),
            KeyValue::bool("error", true),
            KeyValue::int64("big", i64::MAX),
            KeyValue::int64("negative", -42),
            KeyValue::float64("ratio", 1.5),
            KeyValue::binary("payload", vec![1, 2, 3, 4]),
        ]
    }

    #[test]
    fn encoded_form_is_positional_triples() {
        let encoded = encode_tags(&all_types()).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(encoded).unwrap(),
            @r###"[["http.method",0,"GET"],["error",1,true],["big",2,"9223372036854775807"],["negative",2,"-42"],["ratio",3,1.5],["payload",4,"AQIDBA"]]"###
        );
    }

    #[test]
    fn every_value_type_survives_encoding() {
        let tags = all_types();
        assert_eq!(decode_tags(&encode_tags(&tags).unwrap()).unwrap(), tags);
    }

    #[test]
    fn empty_tags_stay_an_empty_list() {
        let encoded = encode_tags(&[]).unwrap();
        assert_eq!(encoded, b"[]");
        let decoded = decode_tags(&encoded).unwrap();
        assert_eq!(decoded, Vec::<KeyValue>::new());
        assert_eq!(decode_tags(b"null").unwrap(), Vec::<KeyValue>::new());
    }

    #[test]
    fn non_finite_floats_cant_be_encoded() {
        let err = encode_tags(&[KeyValue::float64("nan", f64::NAN)]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedAttribute { .. }));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        for raw in [
            r#"{"a": 1}"#,
            r#"[["k", 0]]"#,
            r#"[[1, 0, "v"]]"#,
            r#"[["k", 9, "v"]]"#,
            r#"[["k", 1, "true"]]"#,
            r#"[["k", 2, 5]]"#,
            r#"[["k", 2, "five"]]"#,
            r#"[["k", 3, "1.5"]]"#,
            r#"[["k", 4, "!!!"]]"#,
            r#"not json"#,
        ] {
            let err = decode_tags(raw.as_bytes()).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedAttribute { .. }),
                "{raw} gave {err:?}"
            );
        }
    }
}
