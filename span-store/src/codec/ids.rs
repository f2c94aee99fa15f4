use super::CodecError;
use span_model::{SpanId, TraceId};

pub const TRACE_ID_LEN: usize = 16;
pub const SPAN_ID_LEN: usize = 8;

/// `high` little-endian in bytes 0..8, `low` little-endian in bytes 8..16.
pub fn encode_trace_id(trace_id: TraceId) -> [u8; TRACE_ID_LEN] {
    let mut raw = [0u8; TRACE_ID_LEN];
    raw[..8].copy_from_slice(&trace_id.high.to_le_bytes());
    raw[8..].copy_from_slice(&trace_id.low.to_le_bytes());
    raw
}

pub fn decode_trace_id(raw: &[u8]) -> Result<TraceId, CodecError> {
    let raw: &[u8; TRACE_ID_LEN] =
        raw.try_into()
            .map_err(|_| CodecError::MalformedIdentifier {
                expected: TRACE_ID_LEN,
                actual: raw.len(),
            })?;
    let (high, low) = raw.split_at(8);
    Ok(TraceId {
        high: u64::from_le_bytes(to_u64_bytes(high)),
        low: u64::from_le_bytes(to_u64_bytes(low)),
    })
}

pub fn encode_span_id(span_id: SpanId) -> [u8; SPAN_ID_LEN] {
    span_id.0.to_le_bytes()
}

pub fn decode_span_id(raw: &[u8]) -> Result<SpanId, CodecError> {
    let raw: [u8; SPAN_ID_LEN] = raw
        .try_into()
        .map_err(|_| CodecError::MalformedIdentifier {
            expected: SPAN_ID_LEN,
            actual: raw.len(),
        })?;
    Ok(SpanId(u64::from_le_bytes(raw)))
}

// callers always pass exactly 8 bytes
fn to_u64_bytes(half: &[u8]) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(half);
    bytes
}
