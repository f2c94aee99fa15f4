use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

pub mod time_conversion;

pub type ServiceName = String;

/// Limit used when a search does not ask for a specific number of traces.
pub const DEFAULT_NUM_TRACES: usize = 100;

/// 128-bit trace identifier split in two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl Display for TraceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub input: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid hex identifier: {:?}", self.input)
    }
}

impl std::error::Error for ParseIdError {}

/// Only plain hex digits, `from_str_radix` alone would also take a leading `+`.
fn parse_hex_u64(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError {
            input: s.to_string(),
        };
        // checked up front so the split below lands on a char boundary
        if s.len() > 32 || !s.is_ascii() {
            return Err(err());
        }
        let split_at = s.len().saturating_sub(16);
        let (high, low) = s.split_at(split_at);
        let high = if high.is_empty() {
            0
        } else {
            parse_hex_u64(high).ok_or_else(err)?
        };
        let low = parse_hex_u64(low).ok_or_else(err)?;
        Ok(Self { high, low })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SpanId(pub u64);

impl Display for SpanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 16 {
            return Err(ParseIdError {
                input: s.to_string(),
            });
        }
        parse_hex_u64(s).map(SpanId).ok_or_else(|| ParseIdError {
            input: s.to_string(),
        })
    }
}

/// Type tag of an attribute value. The discriminants are part of the stored format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ValueType {
    String = 0,
    Bool = 1,
    Int64 = 2,
    Float64 = 3,
    Binary = 4,
}

impl ValueType {
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::String),
            1 => Some(Self::Bool),
            2 => Some(Self::Int64),
            3 => Some(Self::Float64),
            4 => Some(Self::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    String(String),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Binary(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Int64(_) => ValueType::Int64,
            Value::Float64(_) => ValueType::Float64,
            Value::Binary(_) => ValueType::Binary,
        }
    }
}

/// A typed key/value pair, called a tag on spans and a field on logs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Value::String(value.into()),
        }
    }
    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: Value::Bool(value),
        }
    }
    pub fn int64(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: Value::Int64(value),
        }
    }
    pub fn float64(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: Value::Float64(value),
        }
    }
    pub fn binary(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Value::Binary(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Log {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum RefType {
    ChildOf = 0,
    FollowsFrom = 1,
}

impl RefType {
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::ChildOf),
            1 => Some(Self::FollowsFrom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SpanRef {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub ref_type: RefType,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Process {
    pub service_name: ServiceName,
    pub tags: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Server,
    Client,
    Producer,
    Consumer,
    Internal,
    Ephemeral,
}

/// Conventional tag carrying the kind of a span.
pub const SPAN_KIND_TAG: &str = "span.kind";

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Unspecified => "unspecified",
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Internal => "internal",
            SpanKind::Ephemeral => "ephemeral",
        }
    }

    /// Reads the kind out of a `span.kind` string tag, falling back to `Unspecified`.
    pub fn from_tags(tags: &[KeyValue]) -> Self {
        tags.iter()
            .find(|kv| kv.key == SPAN_KIND_TAG)
            .and_then(|kv| match &kv.value {
                Value::String(s) => SpanKind::from_str(s).ok(),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl Display for SpanKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpanKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" | "" => Ok(Self::Unspecified),
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "internal" => Ok(Self::Internal),
            "ephemeral" => Ok(Self::Ephemeral),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub operation_name: String,
    pub references: Vec<SpanRef>,
    pub flags: i32,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub tags: Vec<KeyValue>,
    pub logs: Vec<Log>,
    pub process: Process,
    pub process_id: String,
    pub warnings: Vec<String>,
    pub kind: SpanKind,
}

/// Spans sharing one trace id. Only exists at query time.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Trace {
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    pub name: String,
    pub kind: SpanKind,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DependencyLink {
    pub parent: ServiceName,
    pub child: ServiceName,
    pub call_count: u64,
    pub source: String,
}

/// Search filters. Every `None` (or empty name, or zero duration) disables that filter.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct TraceQueryParameters {
    pub service_name: Option<ServiceName>,
    pub operation_name: Option<String>,
    pub start_time_min: Option<DateTime<Utc>>,
    pub start_time_max: Option<DateTime<Utc>>,
    pub duration_min: Option<Duration>,
    pub duration_max: Option<Duration>,
    pub num_traces: usize,
}

impl TraceQueryParameters {
    pub fn effective_num_traces(&self) -> usize {
        match self.num_traces {
            0 => DEFAULT_NUM_TRACES,
            n => n,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trace_id_hex_round_trips() {
        let id = TraceId::new(0xdead_beef, 0x0123_4567_89ab_cdef);
        assert_eq!(id.to_string(), "00000000deadbeef0123456789abcdef");
        assert_eq!(TraceId::from_str(&id.to_string()), Ok(id));

        let low_only = TraceId::new(0, 42);
        assert_eq!(low_only.to_string(), "000000000000002a");
        assert_eq!(TraceId::from_str("2a"), Ok(low_only));
    }

    #[test]
    fn invalid_hex_ids_are_rejected() {
        assert!(TraceId::from_str("").is_err());
        assert!(TraceId::from_str("xyz").is_err());
        assert!(TraceId::from_str(&"f".repeat(33)).is_err());
        assert!(SpanId::from_str(&"f".repeat(17)).is_err());
        assert_eq!(SpanId::from_str("ff"), Ok(SpanId(255)));
        assert!(TraceId::from_str("+1").is_err());
        assert!(TraceId::from_str(&format!("+{}", "1".repeat(16))).is_err());
        assert!(SpanId::from_str("+ff").is_err());
        assert!(SpanId::from_str("-1").is_err());
        assert!(TraceId::from_str(&"é".repeat(9)).is_err());
    }

    #[test]
    fn span_kind_comes_from_tag() {
        let tags = vec![
            KeyValue::bool("error", false),
            KeyValue::string(SPAN_KIND_TAG, "client"),
        ];
        assert_eq!(SpanKind::from_tags(&tags), SpanKind::Client);
        assert_eq!(
            SpanKind::from_tags(&[KeyValue::string(SPAN_KIND_TAG, "bogus")]),
            SpanKind::Unspecified
        );
        assert_eq!(SpanKind::from_tags(&[]), SpanKind::Unspecified);
    }

    #[test]
    fn ordinals_are_stable() {
        for vt in [
            ValueType::String,
            ValueType::Bool,
            ValueType::Int64,
            ValueType::Float64,
            ValueType::Binary,
        ] {
            assert_eq!(ValueType::from_ordinal(vt.ordinal() as i64), Some(vt));
        }
        assert_eq!(ValueType::from_ordinal(5), None);
        assert_eq!(RefType::from_ordinal(1), Some(RefType::FollowsFrom));
        assert_eq!(RefType::from_ordinal(-1), None);
    }

    #[test]
    fn zero_num_traces_means_default() {
        let query = TraceQueryParameters::default();
        assert_eq!(query.effective_num_traces(), DEFAULT_NUM_TRACES);
        let query = TraceQueryParameters {
            num_traces: 3,
            ..Default::default()
        };
        assert_eq!(query.effective_num_traces(), 3);
    }

    #[test]
    fn span_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SpanKind::Producer).unwrap(),
            "\"producer\""
        );
    }
}
