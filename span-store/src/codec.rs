//! Conversions between the span model and the compact forms stored in the `spans` table.
//!
//! Identifiers become fixed width little-endian byte strings. Tags, logs and
//! references become JSON arrays of positional tuples, so a row can be decoded
//! without any schema knowledge beyond the tuple layout.

use thiserror::Error;

pub mod attributes;
pub mod events;
pub mod ids;
pub mod references;

pub use attributes::{decode_tags, encode_tags};
pub use events::{decode_logs, encode_logs};
pub use ids::{decode_span_id, decode_trace_id, encode_span_id, encode_trace_id};
pub use references::{decode_span_refs, encode_span_refs};

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed identifier: expected {expected} bytes, got {actual}")]
    MalformedIdentifier { expected: usize, actual: usize },
    #[error("stored value {value} does not fit in {target}")]
    OutOfRange { value: i64, target: &'static str },
    #[error("malformed attribute: {reason}")]
    MalformedAttribute {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },
    #[error("malformed event: {reason}")]
    MalformedEvent {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },
    #[error("malformed reference: {reason}")]
    MalformedReference {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl CodecError {
    pub(crate) fn attribute<S: Into<String>>(reason: S) -> Self {
        Self::MalformedAttribute {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn attribute_caused_by<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxedSource>,
    {
        Self::MalformedAttribute {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn event<S: Into<String>>(reason: S) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn event_caused_by<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxedSource>,
    {
        Self::MalformedEvent {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn reference<S: Into<String>>(reason: S) -> Self {
        Self::MalformedReference {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn reference_caused_by<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxedSource>,
    {
        Self::MalformedReference {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }
}

/// Parses a stored JSON column. A `null` document counts as an empty list.
pub(crate) fn parse_json_list(
    raw: &[u8],
    context: &str,
) -> Result<Vec<serde_json::Value>, backtraced_error::SerdeJsonError> {
    let parsed: Option<Vec<serde_json::Value>> = serde_json::from_slice(raw).map_err(|e| {
        backtraced_error::SerdeJsonError::from_serde_json_error(e, context, raw)
    })?;
    Ok(parsed.unwrap_or_default())
}
