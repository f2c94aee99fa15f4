use super::{SpanWriter, StoreError};
use crate::codec;
use crate::database::{self, DbSpanKind, InsertSpanParams, OperationKey};
use async_trait::async_trait;
use span_model::Span;
use sqlx::PgPool;
use tracing::{debug, instrument};

/// Writes each span as: service upsert, service id lookup, operation upsert,
/// operation id lookup, encoding, span insert.
///
/// The steps are not wrapped in a transaction, so a failure after the
/// operation upsert leaves the operation row behind without a span.
#[derive(Debug, Clone)]
pub struct PgSpanWriter {
    con: PgPool,
}

impl PgSpanWriter {
    pub fn new(con: PgPool) -> Self {
        Self { con }
    }
}

#[async_trait]
impl SpanWriter for PgSpanWriter {
    #[instrument(skip_all, fields(trace_id = %span.trace_id, span_id = %span.span_id))]
    async fn write_span(&self, span: &Span) -> Result<(), StoreError> {
        let service_name = &span.process.service_name;
        let service_upsert_failed = |source| StoreError::ServiceUpsert {
            service_name: service_name.clone(),
            source,
        };
        database::upsert_service(&self.con, service_name)
            .await
            .map_err(service_upsert_failed)?;
        let service_id = database::get_service_id(&self.con, service_name)
            .await
            .map_err(service_upsert_failed)?;

        let operation = OperationKey {
            name: &span.operation_name,
            service_id,
            kind: DbSpanKind::from(span.kind),
        };
        let operation_upsert_failed = |source| StoreError::OperationUpsert {
            service_name: service_name.clone(),
            operation_name: span.operation_name.clone(),
            source,
        };
        database::upsert_operation(&self.con, operation)
            .await
            .map_err(operation_upsert_failed)?;
        let operation_id = database::get_operation_id(&self.con, operation)
            .await
            .map_err(operation_upsert_failed)?;

        let tags = codec::encode_tags(&span.tags).map_err(StoreError::encoding("tags"))?;
        let process_tags = codec::encode_tags(&span.process.tags)
            .map_err(StoreError::encoding("process tags"))?;
        let logs = codec::encode_logs(&span.logs).map_err(StoreError::encoding("logs"))?;
        let refs = codec::encode_span_refs(&span.references)
            .map_err(StoreError::encoding("references"))?;
        let trace_id = codec::encode_trace_id(span.trace_id);
        let span_id = codec::encode_span_id(span.span_id);

        let row_id = database::insert_span(
            &self.con,
            InsertSpanParams {
                span_id: &span_id,
                trace_id: &trace_id,
                operation_id,
                service_id,
                flags: i64::from(span.flags),
                start_time: span.start_time,
                duration: database::duration_to_interval(span.duration),
                tags: &tags,
                process_id: &span.process_id,
                process_tags: &process_tags,
                warnings: &span.warnings,
                logs: &logs,
                refs: &refs,
                kind: operation.kind,
            },
        )
        .await
        .map_err(|source| StoreError::SpanInsert { source })?;
        debug!(row_id, "span stored");
        Ok(())
    }
}
