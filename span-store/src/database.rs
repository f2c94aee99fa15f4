//! One function per SQL statement. Everything above this module talks in
//! domain types, everything in here talks in columns.

use crate::config::DbConfig;
use backtraced_error::SqlxError;
use chrono::{DateTime, Utc};
use span_model::time_conversion::{duration_to_micros, micros_to_duration};
use span_model::SpanKind;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, info_span, instrument, Instrument};

pub mod find_trace_ids;

pub use find_trace_ids::{find_trace_ids, Filter, FindTraceIdsParams};

const MICROS_IN_1_DAY: i64 = 24 * 60 * 60 * 1_000_000;
// postgres justifies a month as 30 days
const DAYS_IN_1_MONTH: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "spankind", rename_all = "lowercase")]
pub enum DbSpanKind {
    Server,
    Client,
    Unspecified,
    Producer,
    Consumer,
    Ephemeral,
    Internal,
}

impl From<SpanKind> for DbSpanKind {
    fn from(value: SpanKind) -> Self {
        match value {
            SpanKind::Unspecified => Self::Unspecified,
            SpanKind::Server => Self::Server,
            SpanKind::Client => Self::Client,
            SpanKind::Producer => Self::Producer,
            SpanKind::Consumer => Self::Consumer,
            SpanKind::Internal => Self::Internal,
            SpanKind::Ephemeral => Self::Ephemeral,
        }
    }
}

impl DbSpanKind {
    pub fn to_model(self) -> SpanKind {
        match self {
            DbSpanKind::Server => SpanKind::Server,
            DbSpanKind::Client => SpanKind::Client,
            DbSpanKind::Unspecified => SpanKind::Unspecified,
            DbSpanKind::Producer => SpanKind::Producer,
            DbSpanKind::Consumer => SpanKind::Consumer,
            DbSpanKind::Ephemeral => SpanKind::Ephemeral,
            DbSpanKind::Internal => SpanKind::Internal,
        }
    }
}

pub fn duration_to_interval(duration: Duration) -> PgInterval {
    PgInterval {
        months: 0,
        days: 0,
        microseconds: duration_to_micros(duration),
    }
}

pub fn interval_to_duration(interval: &PgInterval) -> Duration {
    let days = i64::from(interval.months) * DAYS_IN_1_MONTH + i64::from(interval.days);
    let micros = days
        .saturating_mul(MICROS_IN_1_DAY)
        .saturating_add(interval.microseconds);
    micros_to_duration(micros)
}

#[instrument(skip_all)]
pub async fn connect_to_db(config: &DbConfig) -> Result<PgPool, SqlxError> {
    let options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| SqlxError::from_sqlx_error(e, "parsing database url"))?;
    let con = PgPoolOptions::new()
        .max_connections(u32::from(config.max_db_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .instrument(info_span!("Connecting to the DB"))
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "connecting to the database"))?;
    info!("connected to postgres");
    Ok(con)
}

#[instrument(skip_all)]
pub async fn migrate(con: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(con).await?;
    info!("database migrations applied");
    Ok(())
}

#[instrument(skip_all)]
pub async fn ping(con: &PgPool) -> Result<(), SqlxError> {
    sqlx::query("SELECT 1")
        .execute(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "pinging the database"))?;
    Ok(())
}

#[instrument(skip(con))]
pub async fn upsert_service(con: &PgPool, name: &str) -> Result<(), SqlxError> {
    sqlx::query("INSERT INTO services (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, format!("upserting service {name:?}")))?;
    Ok(())
}

#[instrument(skip(con))]
pub async fn get_service_id(con: &PgPool, name: &str) -> Result<i64, SqlxError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM services WHERE name = $1")
        .bind(name)
        .fetch_one(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, format!("getting id of service {name:?}")))
}

#[derive(Debug, Clone, Copy)]
pub struct OperationKey<'a> {
    pub name: &'a str,
    pub service_id: i64,
    pub kind: DbSpanKind,
}

#[instrument(skip(con))]
pub async fn upsert_operation(con: &PgPool, key: OperationKey<'_>) -> Result<(), SqlxError> {
    sqlx::query(
        "INSERT INTO operations (name, service_id, kind) VALUES ($1, $2, $3) \
         ON CONFLICT (name, service_id, kind) DO NOTHING",
    )
    .bind(key.name)
    .bind(key.service_id)
    .bind(key.kind)
    .execute(con)
    .await
    .map_err(|e| SqlxError::from_sqlx_error(e, format!("upserting operation {key:?}")))?;
    Ok(())
}

#[instrument(skip(con))]
pub async fn get_operation_id(con: &PgPool, key: OperationKey<'_>) -> Result<i64, SqlxError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM operations WHERE name = $1 AND service_id = $2 AND kind = $3",
    )
    .bind(key.name)
    .bind(key.service_id)
    .bind(key.kind)
    .fetch_one(con)
    .await
    .map_err(|e| SqlxError::from_sqlx_error(e, format!("getting id of operation {key:?}")))
}

#[derive(Debug)]
pub struct InsertSpanParams<'a> {
    pub span_id: &'a [u8],
    pub trace_id: &'a [u8],
    pub operation_id: i64,
    pub service_id: i64,
    pub flags: i64,
    pub start_time: DateTime<Utc>,
    pub duration: PgInterval,
    pub tags: &'a [u8],
    pub process_id: &'a str,
    pub process_tags: &'a [u8],
    pub warnings: &'a [String],
    pub logs: &'a [u8],
    pub refs: &'a [u8],
    pub kind: DbSpanKind,
}

/// Returns the row id of the new span.
#[instrument(skip_all)]
pub async fn insert_span(con: &PgPool, params: InsertSpanParams<'_>) -> Result<i64, SqlxError> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO spans (span_id, trace_id, operation_id, service_id, flags, start_time, \
         duration, tags, process_id, process_tags, warnings, logs, refs, kind) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
    )
    .bind(params.span_id)
    .bind(params.trace_id)
    .bind(params.operation_id)
    .bind(params.service_id)
    .bind(params.flags)
    .bind(params.start_time)
    .bind(params.duration)
    .bind(params.tags)
    .bind(params.process_id)
    .bind(params.process_tags)
    .bind(params.warnings)
    .bind(params.logs)
    .bind(params.refs)
    .bind(params.kind)
    .fetch_one(con)
    .await
    .map_err(|e| SqlxError::from_sqlx_error(e, "inserting span"))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SpanRow {
    pub span_id: Vec<u8>,
    pub trace_id: Vec<u8>,
    pub operation_name: String,
    pub flags: i64,
    pub start_time: DateTime<Utc>,
    pub duration: PgInterval,
    pub tags: Vec<u8>,
    pub service_name: String,
    pub process_id: String,
    pub process_tags: Vec<u8>,
    pub warnings: Vec<String>,
    pub logs: Vec<u8>,
    pub refs: Vec<u8>,
    pub kind: DbSpanKind,
}

#[instrument(skip_all)]
pub async fn get_trace_spans(con: &PgPool, trace_id: &[u8]) -> Result<Vec<SpanRow>, SqlxError> {
    let rows = sqlx::query_as::<_, SpanRow>(
        "SELECT
            spans.span_id,
            spans.trace_id,
            operations.name AS operation_name,
            spans.flags,
            spans.start_time,
            spans.duration,
            spans.tags,
            services.name AS service_name,
            spans.process_id,
            spans.process_tags,
            spans.warnings,
            spans.logs,
            spans.refs,
            spans.kind
        FROM spans
            INNER JOIN operations ON (operations.id = spans.operation_id)
            INNER JOIN services ON (services.id = spans.service_id)
        WHERE spans.trace_id = $1
        ORDER BY spans.start_time, spans.id",
    )
    .bind(trace_id)
    .fetch_all(con)
    .await
    .map_err(|e| SqlxError::from_sqlx_error(e, "getting trace spans"))?;
    debug!("Got {} spans", rows.len());
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn get_services(con: &PgPool) -> Result<Vec<String>, SqlxError> {
    sqlx::query_scalar::<_, String>("SELECT name FROM services ORDER BY name")
        .fetch_all(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "getting services"))
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OperationRow {
    pub name: String,
    pub kind: DbSpanKind,
}

#[instrument(skip(con))]
pub async fn get_operations(
    con: &PgPool,
    service_name: &str,
) -> Result<Vec<OperationRow>, SqlxError> {
    sqlx::query_as::<_, OperationRow>(
        "SELECT operations.name, operations.kind
        FROM operations
            INNER JOIN services ON (operations.service_id = services.id)
        WHERE services.name = $1
        ORDER BY operations.name, operations.kind",
    )
    .bind(service_name)
    .fetch_all(con)
    .await
    .map_err(|e| {
        SqlxError::from_sqlx_error(e, format!("getting operations of service {service_name:?}"))
    })
}

/// Deletes every span that started strictly before `cutoff`, returning how many were removed.
#[instrument(skip(con))]
pub async fn clean_spans(con: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, SqlxError> {
    let res = sqlx::query("DELETE FROM spans WHERE spans.start_time < $1::TIMESTAMPTZ")
        .bind(cutoff)
        .execute(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "deleting old spans"))?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn spans_disk_size(con: &PgPool) -> Result<i64, SqlxError> {
    sqlx::query_scalar::<_, i64>("SELECT pg_total_relation_size('spans')")
        .fetch_one(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "getting spans table size"))
}

#[instrument(skip_all)]
pub async fn spans_count(con: &PgPool) -> Result<i64, SqlxError> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM spans")
        .fetch_one(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "counting spans"))
}

/// Empties every table. Only meant for test setups.
#[instrument(skip_all)]
pub async fn truncate_all(con: &PgPool) -> Result<(), SqlxError> {
    sqlx::query("TRUNCATE spans, operations, services CASCADE")
        .execute(con)
        .await
        .map_err(|e| SqlxError::from_sqlx_error(e, "truncating tables"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn intervals_convert_to_durations() {
        let interval = duration_to_interval(Duration::from_micros(1_500));
        assert_eq!(interval.microseconds, 1_500);
        assert_eq!(interval_to_duration(&interval), Duration::from_micros(1_500));

        let justified = PgInterval {
            months: 1,
            days: 2,
            microseconds: 3,
        };
        assert_eq!(
            interval_to_duration(&justified),
            Duration::from_micros((32 * MICROS_IN_1_DAY + 3) as u64)
        );

        let negative = PgInterval {
            months: 0,
            days: 0,
            microseconds: -1,
        };
        assert_eq!(interval_to_duration(&negative), Duration::ZERO);
    }

    #[test]
    fn every_span_kind_maps_back_and_forth() {
        for kind in [
            SpanKind::Unspecified,
            SpanKind::Server,
            SpanKind::Client,
            SpanKind::Producer,
            SpanKind::Consumer,
            SpanKind::Internal,
            SpanKind::Ephemeral,
        ] {
            assert_eq!(DbSpanKind::from(kind).to_model(), kind);
        }
    }
}
