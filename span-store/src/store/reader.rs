use super::{SpanReader, StoreError};
use crate::codec::{self, CodecError};
use crate::database::{self, FindTraceIdsParams, SpanRow};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use span_model::{Operation, Process, ServiceName, Span, Trace, TraceId, TraceQueryParameters};
use sqlx::PgPool;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct PgSpanReader {
    con: PgPool,
    fetch_concurrency: usize,
}

impl PgSpanReader {
    /// Fetches the traces of a search one after the other.
    pub fn new(con: PgPool) -> Self {
        Self {
            con,
            fetch_concurrency: 1,
        }
    }

    /// Fetches up to `fetch_concurrency` traces of a search at once. Results
    /// keep the order of the matching ids.
    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }
}

#[async_trait]
impl SpanReader for PgSpanReader {
    #[instrument(skip_all)]
    async fn get_services(&self) -> Result<Vec<ServiceName>, StoreError> {
        database::get_services(&self.con)
            .await
            .map_err(StoreError::query("get services"))
    }

    #[instrument(skip(self))]
    async fn get_operations(&self, service_name: &str) -> Result<Vec<Operation>, StoreError> {
        let rows = database::get_operations(&self.con, service_name)
            .await
            .map_err(StoreError::query("get operations"))?;
        Ok(rows
            .into_iter()
            .map(|row| Operation {
                name: row.name,
                kind: row.kind.to_model(),
            })
            .collect())
    }

    #[instrument(skip_all, fields(%trace_id))]
    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace, StoreError> {
        let rows = database::get_trace_spans(&self.con, &codec::encode_trace_id(trace_id))
            .await
            .map_err(StoreError::query("get trace"))?;
        if rows.is_empty() {
            return Err(StoreError::TraceNotFound { trace_id });
        }
        let spans = rows
            .into_iter()
            .map(span_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Trace { spans })
    }

    #[instrument(skip_all)]
    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>, StoreError> {
        let trace_ids = self.find_trace_ids(query).await?;
        debug!("Fetching {} traces", trace_ids.len());
        futures::stream::iter(trace_ids)
            .map(|trace_id| self.get_trace(trace_id))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await
    }

    #[instrument(skip_all)]
    async fn find_trace_ids(
        &self,
        query: &TraceQueryParameters,
    ) -> Result<Vec<TraceId>, StoreError> {
        let raw_ids =
            database::find_trace_ids(&self.con, FindTraceIdsParams::from_query(query))
                .await
                .map_err(StoreError::query("find trace ids"))?;
        raw_ids
            .iter()
            .map(|raw| codec::decode_trace_id(raw).map_err(StoreError::decoding("trace id")))
            .collect()
    }
}

pub(crate) fn span_from_row(row: SpanRow) -> Result<Span, StoreError> {
    Ok(Span {
        trace_id: codec::decode_trace_id(&row.trace_id)
            .map_err(StoreError::decoding("trace id"))?,
        span_id: codec::decode_span_id(&row.span_id).map_err(StoreError::decoding("span id"))?,
        operation_name: row.operation_name,
        references: codec::decode_span_refs(&row.refs)
            .map_err(StoreError::decoding("references"))?,
        flags: i32::try_from(row.flags).map_err(|_| StoreError::Decoding {
            field: "flags",
            source: CodecError::OutOfRange {
                value: row.flags,
                target: "i32",
            },
        })?,
        start_time: row.start_time,
        duration: database::interval_to_duration(&row.duration),
        tags: codec::decode_tags(&row.tags).map_err(StoreError::decoding("tags"))?,
        logs: codec::decode_logs(&row.logs).map_err(StoreError::decoding("logs"))?,
        process: Process {
            service_name: row.service_name,
            tags: codec::decode_tags(&row.process_tags)
                .map_err(StoreError::decoding("process tags"))?,
        },
        process_id: row.process_id,
        warnings: row.warnings,
        kind: row.kind.to_model(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::{duration_to_interval, DbSpanKind};
    use chrono::{TimeZone, Utc};
    use span_model::{KeyValue, SpanKind};
    use std::time::Duration;

    fn row() -> SpanRow {
        SpanRow {
            span_id: vec![7, 0, 0, 0, 0, 0, 0, 0],
            trace_id: vec![1, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0],
            operation_name: "GET /orders".to_string(),
            flags: 1,
            start_time: Utc.timestamp_opt(1_700_000_000, 123_000).unwrap(),
            duration: duration_to_interval(Duration::from_micros(2_500)),
            tags: br#"[["http.status_code",2,"200"]]"#.to_vec(),
            service_name: "svc-1".to_string(),
            process_id: "p1".to_string(),
            process_tags: b"[]".to_vec(),
            warnings: vec!["clock skew".to_string()],
            logs: b"[]".to_vec(),
            refs: b"[]".to_vec(),
            kind: DbSpanKind::Server,
        }
    }

    #[test]
    fn rows_decode_into_spans() {
        let span = span_from_row(row()).unwrap();
        assert_eq!(span.trace_id, TraceId::new(1, 2));
        assert_eq!(span.span_id.0, 7);
        assert_eq!(span.duration, Duration::from_micros(2_500));
        assert_eq!(span.tags, vec![KeyValue::int64("http.status_code", 200)]);
        assert_eq!(span.process.service_name, "svc-1");
        assert!(span.process.tags.is_empty());
        assert!(span.logs.is_empty());
        assert_eq!(span.kind, SpanKind::Server);
    }

    #[test]
    fn undecodable_columns_name_the_field() {
        let mut bad = row();
        bad.span_id = vec![1, 2, 3];
        assert!(matches!(
            span_from_row(bad),
            Err(StoreError::Decoding {
                field: "span id",
                ..
            })
        ));

        let mut bad = row();
        bad.flags = i64::from(i32::MAX) + 1;
        assert!(matches!(
            span_from_row(bad),
            Err(StoreError::Decoding {
                field: "flags",
                source: CodecError::OutOfRange { .. },
            })
        ));

        let mut bad = row();
        bad.logs = b"{}".to_vec();
        assert!(matches!(
            span_from_row(bad),
            Err(StoreError::Decoding { field: "logs", .. })
        ));
    }
}
