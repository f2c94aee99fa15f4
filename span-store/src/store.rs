//! The storage contract, split into the capabilities a transport can ask for.

use crate::metrics::Metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use span_model::{
    DependencyLink, Operation, ServiceName, Span, Trace, TraceId, TraceQueryParameters,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

mod error;
mod instrumented;
mod reader;
mod writer;

pub use error::StoreError;
pub use instrumented::{InstrumentedReader, InstrumentedWriter};
pub use reader::PgSpanReader;
pub use writer::PgSpanWriter;

#[async_trait]
pub trait SpanReader: Send + Sync {
    async fn get_services(&self) -> Result<Vec<ServiceName>, StoreError>;
    /// Empty for unknown services.
    async fn get_operations(&self, service_name: &str) -> Result<Vec<Operation>, StoreError>;
    /// Fails with [`StoreError::TraceNotFound`] when no span carries `trace_id`.
    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace, StoreError>;
    /// Either every matching trace or an error, never a partial list.
    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>, StoreError>;
    async fn find_trace_ids(
        &self,
        query: &TraceQueryParameters,
    ) -> Result<Vec<TraceId>, StoreError>;
}

#[async_trait]
pub trait SpanWriter: Send + Sync {
    async fn write_span(&self, span: &Span) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait DependencyReader: Send + Sync {
    async fn get_dependencies(
        &self,
        end_time: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Vec<DependencyLink>, StoreError>;
}

/// Service dependency graphs are not computed, every lookup is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

#[async_trait]
impl DependencyReader for NoDependencies {
    async fn get_dependencies(
        &self,
        _end_time: DateTime<Utc>,
        _lookback: Duration,
    ) -> Result<Vec<DependencyLink>, StoreError> {
        Ok(vec![])
    }
}

/// Bundles the three capabilities. Clones share the same implementations.
#[derive(Clone)]
pub struct Store {
    reader: Arc<dyn SpanReader>,
    writer: Arc<dyn SpanWriter>,
    dependency_reader: Arc<dyn DependencyReader>,
}

impl Store {
    /// Postgres reader and writer, both instrumented into `metrics`.
    pub fn new(con: PgPool, metrics: Arc<Metrics>) -> Self {
        Self::from_parts(
            Arc::new(InstrumentedReader::new(
                PgSpanReader::new(con.clone()),
                Arc::clone(&metrics),
            )),
            Arc::new(InstrumentedWriter::new(PgSpanWriter::new(con), metrics)),
            Arc::new(NoDependencies),
        )
    }

    pub fn from_parts(
        reader: Arc<dyn SpanReader>,
        writer: Arc<dyn SpanWriter>,
        dependency_reader: Arc<dyn DependencyReader>,
    ) -> Self {
        Self {
            reader,
            writer,
            dependency_reader,
        }
    }

    pub fn span_reader(&self) -> Arc<dyn SpanReader> {
        Arc::clone(&self.reader)
    }

    pub fn span_writer(&self) -> Arc<dyn SpanWriter> {
        Arc::clone(&self.writer)
    }

    pub fn dependency_reader(&self) -> Arc<dyn DependencyReader> {
        Arc::clone(&self.dependency_reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn dependencies_are_always_empty() {
        let links = NoDependencies
            .get_dependencies(Utc::now(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(links.is_empty());
    }
}
