//! Trace search with optional filters and a single, constant statement.
//!
//! Every filter is bound as a `(value, enabled)` pair and guarded with
//! `(predicate OR enabled = FALSE)`, so switching filters on and off only
//! changes parameter values, never the SQL text. Postgres can then reuse one
//! prepared statement for every combination.

use super::duration_to_interval;
use backtraced_error::SqlxError;
use chrono::{DateTime, Utc};
use span_model::TraceQueryParameters;
use sqlx::postgres::types::PgInterval;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, instrument};

/// Positional parameters, in order: service name, enabled, operation name,
/// enabled, start time min, enabled, start time max, enabled, duration min,
/// enabled, duration max, enabled, limit.
pub const FIND_TRACE_IDS: &str = "SELECT DISTINCT spans.trace_id
FROM spans
    INNER JOIN operations ON (operations.id = spans.operation_id)
    INNER JOIN services ON (services.id = spans.service_id)
WHERE
    (services.name = $1::TEXT OR $2::BOOLEAN = FALSE) AND
    (operations.name = $3::TEXT OR $4::BOOLEAN = FALSE) AND
    (spans.start_time >= $5::TIMESTAMPTZ OR $6::BOOLEAN = FALSE) AND
    (spans.start_time < $7::TIMESTAMPTZ OR $8::BOOLEAN = FALSE) AND
    (spans.duration > $9::INTERVAL OR $10::BOOLEAN = FALSE) AND
    (spans.duration < $11::INTERVAL OR $12::BOOLEAN = FALSE)
LIMIT $13::BIGINT";

/// A bound filter value. Disabled filters still carry a well typed placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<T> {
    pub value: T,
    pub enabled: bool,
}

impl<T> Filter<T> {
    pub fn enabled(value: T) -> Self {
        Self {
            value,
            enabled: true,
        }
    }

    pub fn disabled(placeholder: T) -> Self {
        Self {
            value: placeholder,
            enabled: false,
        }
    }

    fn from_option(value: Option<T>, placeholder: T) -> Self {
        match value {
            Some(value) => Self::enabled(value),
            None => Self::disabled(placeholder),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindTraceIdsParams {
    pub service_name: Filter<String>,
    pub operation_name: Filter<String>,
    pub start_time_min: Filter<DateTime<Utc>>,
    pub start_time_max: Filter<DateTime<Utc>>,
    pub duration_min: Filter<PgInterval>,
    pub duration_max: Filter<PgInterval>,
    pub limit: i64,
}

impl FindTraceIdsParams {
    /// Empty names and zero durations count as "not filtering".
    pub fn from_query(query: &TraceQueryParameters) -> Self {
        let non_empty = |name: &Option<String>| name.clone().filter(|n| !n.is_empty());
        let positive = |duration: Option<Duration>| {
            duration
                .filter(|d| !d.is_zero())
                .map(duration_to_interval)
        };
        let zero_interval = duration_to_interval(Duration::ZERO);
        let epoch = DateTime::<Utc>::from(std::time::UNIX_EPOCH);
        Self {
            service_name: Filter::from_option(non_empty(&query.service_name), String::new()),
            operation_name: Filter::from_option(non_empty(&query.operation_name), String::new()),
            start_time_min: Filter::from_option(query.start_time_min, epoch),
            start_time_max: Filter::from_option(query.start_time_max, epoch),
            duration_min: Filter::from_option(positive(query.duration_min), zero_interval.clone()),
            duration_max: Filter::from_option(positive(query.duration_max), zero_interval),
            limit: i64::try_from(query.effective_num_traces()).unwrap_or(i64::MAX),
        }
    }
}

/// Returns the encoded ids of at most `limit` distinct traces matching every enabled filter.
#[instrument(skip(con))]
pub async fn find_trace_ids(
    con: &PgPool,
    params: FindTraceIdsParams,
) -> Result<Vec<Vec<u8>>, SqlxError> {
    let ids = sqlx::query_scalar::<_, Vec<u8>>(FIND_TRACE_IDS)
        .bind(params.service_name.value)
        .bind(params.service_name.enabled)
        .bind(params.operation_name.value)
        .bind(params.operation_name.enabled)
        .bind(params.start_time_min.value)
        .bind(params.start_time_min.enabled)
        .bind(params.start_time_max.value)
        .bind(params.start_time_max.enabled)
        .bind(params.duration_min.value)
        .bind(params.duration_min.enabled)
        .bind(params.duration_max.value)
        .bind(params.duration_max.enabled)
        .bind(params.limit)
        .fetch_all(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "finding trace ids"))?;
    debug!("Found {} trace ids", ids.len());
    Ok(ids)
}
