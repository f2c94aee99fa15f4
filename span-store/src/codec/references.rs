use super::ids::{decode_span_id, decode_trace_id, encode_span_id, encode_trace_id};
use super::{parse_json_list, CodecError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;
use span_model::{RefType, SpanRef};

/// Encodes references as `[[base64(trace_id), base64(span_id), ref_type], ...]`.
/// No references is `[]`, never `null`.
pub fn encode_span_refs(refs: &[SpanRef]) -> Result<Vec<u8>, CodecError> {
    let entries: Vec<JsonValue> = refs
        .iter()
        .map(|r| {
            JsonValue::Array(vec![
                JsonValue::String(STANDARD.encode(encode_trace_id(r.trace_id))),
                JsonValue::String(STANDARD.encode(encode_span_id(r.span_id))),
                JsonValue::from(r.ref_type.ordinal()),
            ])
        })
        .collect();
    serde_json::to_vec(&entries)
        .map_err(|e| CodecError::reference_caused_by("serializing references", e))
}

pub fn decode_span_refs(raw: &[u8]) -> Result<Vec<SpanRef>, CodecError> {
    let entries = parse_json_list(raw, "decoding references json")
        .map_err(|e| CodecError::reference_caused_by("references are not a json array", e))?;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| span_ref_from_json(idx, entry))
        .collect()
}

fn span_ref_from_json(idx: usize, entry: &JsonValue) -> Result<SpanRef, CodecError> {
    let (trace_id, span_id, ref_type) = match entry.as_array().map(Vec::as_slice) {
        Some([trace_id, span_id, ref_type]) => (trace_id, span_id, ref_type),
        _ => {
            return Err(CodecError::reference(format!(
                "reference #{idx} is not a [trace_id, span_id, type] triple"
            )))
        }
    };
    let trace_id = decode_base64_field(idx, "trace id", trace_id)?;
    let trace_id = decode_trace_id(&trace_id)
        .map_err(|e| CodecError::reference_caused_by(format!("reference #{idx} trace id"), e))?;
    let span_id = decode_base64_field(idx, "span id", span_id)?;
    let span_id = decode_span_id(&span_id)
        .map_err(|e| CodecError::reference_caused_by(format!("reference #{idx} span id"), e))?;
    let ref_type = ref_type
        .as_i64()
        .and_then(RefType::from_ordinal)
        .ok_or_else(|| {
            CodecError::reference(format!("reference #{idx} has unknown type {ref_type}"))
        })?;
    Ok(SpanRef {
        trace_id,
        span_id,
        ref_type,
    })
}

fn decode_base64_field(idx: usize, field: &str, value: &JsonValue) -> Result<Vec<u8>, CodecError> {
    let as_str = value
        .as_str()
        .ok_or_else(|| CodecError::reference(format!("reference #{idx} {field} is not a string")))?;
    STANDARD
        .decode(as_str)
        .map_err(|e| CodecError::reference_caused_by(format!("reference #{idx} {field} base64"), e))
}

#[cfg(test)]
mod test {
    use super::*;
    use span_model::{SpanId, TraceId};

    fn refs() -> Vec<SpanRef> {
        vec![
            SpanRef {
                trace_id: TraceId::new(1, 2),
                span_id: SpanId(3),
                ref_type: RefType::ChildOf,
            },
            SpanRef {
                trace_id: TraceId::new(u64::MAX, 0),
                span_id: SpanId(u64::MAX),
                ref_type: RefType::FollowsFrom,
            },
        ]
    }

    #[test]
    fn encoded_form_wraps_ids_in_padded_base64() {
        let encoded = encode_span_refs(&refs()[..1]).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(encoded).unwrap(),
            @r###"[["AQAAAAAAAAACAAAAAAAAAA==","AwAAAAAAAAA=",0]]"###
        );
    }

    #[test]
    fn references_survive_encoding() {
        let refs = refs();
        assert_eq!(decode_span_refs(&encode_span_refs(&refs).unwrap()).unwrap(), refs);
    }

    #[test]
    fn no_references_is_an_empty_array() {
        let encoded = encode_span_refs(&[]).unwrap();
        assert_eq!(encoded, b"[]");
        assert_eq!(decode_span_refs(&encoded).unwrap(), vec![]);
        assert_eq!(decode_span_refs(b"null").unwrap(), vec![]);
    }

    #[test]
    fn malformed_references_are_rejected() {
        for raw in [
            r#"[["AQAAAAAAAAACAAAAAAAAAA==","AwAAAAAAAAA="]]"#,
            r#"[["not base64!","AwAAAAAAAAA=",0]]"#,
            r#"[["AQID","AwAAAAAAAAA=",0]]"#,
            r#"[["AQAAAAAAAAACAAAAAAAAAA==","AQID",0]]"#,
            r#"[["AQAAAAAAAAACAAAAAAAAAA==","AwAAAAAAAAA=",2]]"#,
            r#"[[1,"AwAAAAAAAAA=",0]]"#,
            r#"true"#,
        ] {
            let err = decode_span_refs(raw.as_bytes()).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedReference { .. }),
                "{raw} gave {err:?}"
            );
        }
    }
}
